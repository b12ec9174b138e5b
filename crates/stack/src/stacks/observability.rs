//! The collector stack: config bucket, secret, App Runner collector, and the
//! traced function.
//!
//! Declaration order follows the dependency chain:
//!
//! ```text
//! HoneycombApiKey (param) ─► HoneycombApiKeySecret ─────────────┐
//! ConfmapBucket ─► DeployConfmap ──────(DependsOn)──────────────┤
//!        └──────► ApprunnerInstanceRole / ConfmapBucketPolicy ──┤
//!                                                               ▼
//!                                 AdotCollectorService ─► AdotHelloLambda
//! ```
//!
//! Secret and bucket are independent. The function waits on the service only
//! through its exporter endpoint.

use common::template::Template;
use common::{StackError, Token};
use tracing::{debug, info};

use crate::collector::{ConfigArtifact, COLLECTOR_IMAGE, COLLECTOR_PORT};
use crate::config::HONEYCOMB_API_KEY;
use crate::graph::{DependencyGraph, Stack};
use crate::instrumentation::{EnvironmentContract, InstrumentationVariant};
use crate::resources::iam::APPRUNNER_TASKS_PRINCIPAL;
use crate::resources::lambda::{Architecture, Code, LoggingFormat, Runtime};
use crate::resources::{
    AccessGrant, Action, Bucket, BucketPolicy, ConfigObject, Function, FunctionProps,
    GrantStrategy, ImageConfiguration, LayerVersion, Resource, Role, Secret, SecretParameter,
    Service, ServiceProps,
};

const HELLO_HANDLER: &str = include_str!("../../assets/hello_handler.js");

/// Logical ids of the declared resources.
pub mod ids {
    pub const API_KEY_PARAMETER: &str = "HoneycombApiKey";
    pub const API_KEY_SECRET: &str = "HoneycombApiKeySecret";
    pub const CONFMAP_BUCKET: &str = "ConfmapBucket";
    pub const CONFMAP_BUCKET_POLICY: &str = "ConfmapBucketPolicy";
    pub const CONFMAP_DEPLOYMENT: &str = "DeployConfmap";
    pub const INSTANCE_ROLE: &str = "ApprunnerInstanceRole";
    pub const COLLECTOR_SERVICE: &str = "AdotCollectorService";
    pub const HELLO_FUNCTION: &str = "AdotHelloLambda";
    pub const SERVICE_URL_OUTPUT: &str = "CollectorServiceUrl";
}

/// Inputs to [`ObservabilityStack::build`].
#[derive(Debug, Clone)]
pub struct StackProps {
    pub stack_name: String,
    pub region: String,
    pub account: Option<String>,
    pub variant: InstrumentationVariant,
    pub grant_strategy: GrantStrategy,
    /// Overrides the variant's default layer.
    pub layer_arn: Option<String>,
    pub artifact: ConfigArtifact,
    pub function_name: String,
    pub secret_name: String,
}

impl StackProps {
    /// Props with the default names for `region` and `artifact`.
    pub fn new(
        stack_name: impl Into<String>,
        region: impl Into<String>,
        artifact: ConfigArtifact,
    ) -> Self {
        Self {
            stack_name: stack_name.into(),
            region: region.into(),
            account: None,
            variant: InstrumentationVariant::OtelSdk,
            grant_strategy: GrantStrategy::InlinePolicy,
            layer_arn: None,
            artifact,
            function_name: "adot-hello-lambda".into(),
            secret_name: "honeycomb-api-key".into(),
        }
    }
}

/// The declared stack plus handles to its key resources.
#[derive(Debug)]
pub struct ObservabilityStack {
    stack: Stack,
    bucket: Bucket,
    secret: Secret,
    instance_role: Role,
    service: Service,
    function: Function,
    config_grant: AccessGrant,
    secret_grant: AccessGrant,
    environment: EnvironmentContract,
}

impl ObservabilityStack {
    /// Declare every resource of the stack.
    ///
    /// # Errors
    ///
    /// Returns the first [`StackError`] raised by a construct.
    pub fn build(props: &StackProps) -> Result<Self, StackError> {
        let mut stack = Stack::new(&props.stack_name, &props.region, props.account.clone())
            .with_description("ADOT collector on App Runner with a traced Lambda function");

        // -------------------------------------------------------------------
        // Secrets Manager
        // -------------------------------------------------------------------
        let api_key = SecretParameter::declare(
            &mut stack,
            ids::API_KEY_PARAMETER,
            "Honeycomb ingestion API key",
        )?;
        let secret = Secret::from_parameter(
            &mut stack,
            ids::API_KEY_SECRET,
            &props.secret_name,
            &api_key,
        )?;

        // -------------------------------------------------------------------
        // S3
        // -------------------------------------------------------------------
        let bucket = Bucket::declare(&mut stack, ids::CONFMAP_BUCKET)?;
        let confmap =
            ConfigObject::declare(&mut stack, ids::CONFMAP_DEPLOYMENT, &bucket, &props.artifact)?;

        // -------------------------------------------------------------------
        // IAM
        // -------------------------------------------------------------------
        let instance_role =
            Role::declare(&mut stack, ids::INSTANCE_ROLE, APPRUNNER_TASKS_PRINCIPAL, vec![])?;
        let config_grant = AccessGrant::new(
            instance_role.principal(),
            bucket.objects_scope(),
            [Action::S3GetObject],
        )?;
        let bucket_policy = match props.grant_strategy {
            GrantStrategy::InlinePolicy => {
                instance_role.add_to_policy(&mut stack, "S3Access", &config_grant)?;
                None
            }
            GrantStrategy::ResourcePolicy => Some(BucketPolicy::declare(
                &mut stack,
                ids::CONFMAP_BUCKET_POLICY,
                &bucket,
                std::slice::from_ref(&config_grant),
            )?),
        };
        let secret_grant = secret.grant_read(&mut stack, &instance_role)?;

        // -------------------------------------------------------------------
        // App Runner
        // -------------------------------------------------------------------
        let image = ImageConfiguration {
            port: COLLECTOR_PORT,
            start_command: Some(props.artifact.start_command(bucket.name(), &props.region)),
            ..Default::default()
        }
        .with_secret(HONEYCOMB_API_KEY, &secret);

        let service = Service::declare(
            &mut stack,
            ids::COLLECTOR_SERVICE,
            ServiceProps {
                image_identifier: COLLECTOR_IMAGE.into(),
                image_configuration: image,
                instance_role: instance_role.clone(),
            },
        )?;
        // The start command names the bucket, not the object: order on the
        // object (and the bucket policy, when used) explicitly.
        stack.add_dependency(service.logical_id(), confmap.logical_id())?;
        if let Some(policy) = &bucket_policy {
            stack.add_dependency(service.logical_id(), policy.logical_id())?;
        }
        stack.add_output(
            ids::SERVICE_URL_OUTPUT,
            service.service_url(),
            Some("Public host name of the collector"),
        )?;

        // -------------------------------------------------------------------
        // Lambda
        // -------------------------------------------------------------------
        let environment = props
            .variant
            .environment(&props.function_name, &service.service_url())?;
        let layer_arn = props
            .layer_arn
            .clone()
            .unwrap_or_else(|| props.variant.default_layer_arn(&props.region));

        let mut fn_props = FunctionProps::new(
            Runtime::Nodejs22x,
            "index.handler",
            Code::Inline(HELLO_HANDLER.to_owned()),
        );
        fn_props.function_name = Some(props.function_name.clone());
        fn_props.architecture = Architecture::Arm64;
        fn_props.memory_size_mb = 1024;
        fn_props.timeout_secs = 60;
        fn_props.logging_format = LoggingFormat::Json;
        fn_props.layers = vec![LayerVersion::from_arn(Token::literal(layer_arn))];
        fn_props.environment = environment.variables().clone();
        let function = Function::declare(&mut stack, ids::HELLO_FUNCTION, fn_props)?;

        info!(
            stack = %props.stack_name,
            variant = ?props.variant,
            grant_strategy = ?props.grant_strategy,
            resources = stack.resource_count(),
            "stack declared"
        );

        Ok(Self {
            stack,
            bucket,
            secret,
            instance_role,
            service,
            function,
            config_grant,
            secret_grant,
            environment,
        })
    }

    pub fn stack(&self) -> &Stack {
        &self.stack
    }

    pub fn bucket(&self) -> &Bucket {
        &self.bucket
    }

    pub fn secret(&self) -> &Secret {
        &self.secret
    }

    pub fn instance_role(&self) -> &Role {
        &self.instance_role
    }

    pub fn service(&self) -> &Service {
        &self.service
    }

    pub fn function(&self) -> &Function {
        &self.function
    }

    /// The collector's read grant on the configuration objects.
    pub fn config_grant(&self) -> &AccessGrant {
        &self.config_grant
    }

    /// The collector's read grant on the credential secret.
    pub fn secret_grant(&self) -> &AccessGrant {
        &self.secret_grant
    }

    pub fn environment(&self) -> &EnvironmentContract {
        &self.environment
    }

    /// # Errors
    ///
    /// See [`Stack::graph`].
    pub fn graph(&self) -> Result<DependencyGraph, StackError> {
        self.stack.graph()
    }

    /// # Errors
    ///
    /// See [`Stack::synthesize`].
    pub fn synthesize(&self) -> Result<Template, StackError> {
        let template = self.stack.synthesize()?;
        debug!(resources = template.resources.len(), "template rendered");
        Ok(template)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn props() -> StackProps {
        StackProps::new("test-stack", "eu-central-1", ConfigArtifact::bundled().unwrap())
    }

    fn build(variant: InstrumentationVariant, strategy: GrantStrategy) -> ObservabilityStack {
        let mut p = props();
        p.variant = variant;
        p.grant_strategy = strategy;
        ObservabilityStack::build(&p).unwrap()
    }

    fn template_json(s: &ObservabilityStack) -> Value {
        serde_json::to_value(s.synthesize().unwrap()).unwrap()
    }

    #[test]
    fn declares_expected_resources() {
        let s = build(InstrumentationVariant::OtelSdk, GrantStrategy::InlinePolicy);
        let t = s.synthesize().unwrap();
        let mut kinds: Vec<(&str, &str)> = t
            .resources
            .iter()
            .map(|(k, v)| (k.as_str(), v.kind.as_str()))
            .collect();
        kinds.sort();
        assert_eq!(
            kinds,
            vec![
                ("AdotCollectorService", "AWS::AppRunner::Service"),
                ("AdotHelloLambda", "AWS::Lambda::Function"),
                ("AdotHelloLambdaServiceRole", "AWS::IAM::Role"),
                ("ApprunnerInstanceRole", "AWS::IAM::Role"),
                ("ConfmapBucket", "AWS::S3::Bucket"),
                ("DeployConfmap", "Custom::ConfigObject"),
                ("DeployConfmapWriter", "AWS::Lambda::Function"),
                ("DeployConfmapWriterServiceRole", "AWS::IAM::Role"),
                ("HoneycombApiKeySecret", "AWS::SecretsManager::Secret"),
            ]
        );
        assert!(t.parameters[ids::API_KEY_PARAMETER].no_echo);
    }

    #[test]
    fn resource_policy_strategy_adds_bucket_policy() {
        let s = build(InstrumentationVariant::OtelSdk, GrantStrategy::ResourcePolicy);
        let t = template_json(&s);
        let policy = &t["Resources"][ids::CONFMAP_BUCKET_POLICY];
        assert_eq!(policy["Type"], "AWS::S3::BucketPolicy");
        let stmts = policy["Properties"]["PolicyDocument"]["Statement"].as_array().unwrap();
        assert_eq!(stmts.len(), 1);
        assert_eq!(stmts[0]["Action"], "s3:GetObject");
        assert_eq!(
            stmts[0]["Principal"]["AWS"],
            json!({"Fn::GetAtt": [ids::INSTANCE_ROLE, "Arn"]})
        );
        let policies = t["Resources"][ids::INSTANCE_ROLE]["Properties"]["Policies"]
            .as_array()
            .unwrap();
        assert!(policies.iter().all(|p| p["PolicyName"] != "S3Access"));

        let g = s.graph().unwrap();
        assert!(g.depends_on(ids::COLLECTOR_SERVICE, ids::CONFMAP_BUCKET_POLICY));
    }

    #[test]
    fn inline_strategy_puts_read_grant_on_role() {
        let s = build(InstrumentationVariant::OtelSdk, GrantStrategy::InlinePolicy);
        let t = template_json(&s);
        assert!(t["Resources"].get(ids::CONFMAP_BUCKET_POLICY).is_none());
        let policies = t["Resources"][ids::INSTANCE_ROLE]["Properties"]["Policies"]
            .as_array()
            .unwrap();
        let s3 = policies.iter().find(|p| p["PolicyName"] == "S3Access").unwrap();
        assert_eq!(
            s3["PolicyDocument"]["Statement"],
            json!([{
                "Effect": "Allow",
                "Action": "s3:GetObject",
                "Resource": {"Fn::Join": ["", [{"Fn::GetAtt": ["ConfmapBucket", "Arn"]}, "/*"]]},
            }])
        );
    }

    #[test]
    fn collector_service_configuration() {
        let s = build(InstrumentationVariant::OtelSdk, GrantStrategy::InlinePolicy);
        let t = template_json(&s);
        let svc = &t["Resources"][ids::COLLECTOR_SERVICE]["Properties"];
        let repo = &svc["SourceConfiguration"]["ImageRepository"];
        assert_eq!(repo["ImageIdentifier"], COLLECTOR_IMAGE);
        assert_eq!(repo["ImageRepositoryType"], "ECR_PUBLIC");
        assert_eq!(repo["ImageConfiguration"]["Port"], "4318");
        assert_eq!(
            repo["ImageConfiguration"]["RuntimeEnvironmentSecrets"],
            json!([{"Name": "HONEYCOMB_API_KEY", "Value": {"Ref": ids::API_KEY_SECRET}}])
        );
        assert_eq!(
            svc["InstanceConfiguration"]["InstanceRoleArn"],
            json!({"Fn::GetAtt": [ids::INSTANCE_ROLE, "Arn"]})
        );
        assert_eq!(
            t["Resources"][ids::COLLECTOR_SERVICE]["DependsOn"],
            json!([ids::CONFMAP_DEPLOYMENT])
        );
        assert_eq!(
            t["Outputs"][ids::SERVICE_URL_OUTPUT]["Value"],
            json!({"Fn::GetAtt": [ids::COLLECTOR_SERVICE, "ServiceUrl"]})
        );
    }

    #[test]
    fn function_configuration() {
        let s = build(InstrumentationVariant::OtelSdk, GrantStrategy::InlinePolicy);
        let t = template_json(&s);
        let f = &t["Resources"][ids::HELLO_FUNCTION]["Properties"];
        assert_eq!(f["FunctionName"], "adot-hello-lambda");
        assert_eq!(f["Runtime"], "nodejs22.x");
        assert_eq!(f["Architectures"], json!(["arm64"]));
        assert_eq!(f["MemorySize"], 1024);
        assert_eq!(f["Timeout"], 60);
        assert_eq!(f["LoggingConfig"]["LogFormat"], "JSON");
        assert_eq!(
            f["Layers"],
            json!([concat!(
                "arn:aws:lambda:eu-central-1:901920570463:",
                "layer:aws-otel-nodejs-arm64-ver-1-30-1:1"
            )])
        );
        let vars = &f["Environment"]["Variables"];
        assert_eq!(vars["AWS_LAMBDA_EXEC_WRAPPER"], "/opt/otel-handler");
        assert_eq!(vars["OTEL_SERVICE_NAME"], "adot-hello-lambda");
        assert_eq!(vars["OTEL_PROPAGATORS"], "tracecontext");
    }

    #[test]
    fn layer_override_is_used() {
        let mut p = props();
        p.layer_arn = Some("arn:aws:lambda:eu-central-1:111111111111:layer:custom:3".into());
        let s = ObservabilityStack::build(&p).unwrap();
        let t = template_json(&s);
        assert_eq!(
            t["Resources"][ids::HELLO_FUNCTION]["Properties"]["Layers"],
            json!(["arn:aws:lambda:eu-central-1:111111111111:layer:custom:3"])
        );
    }

    #[test]
    fn dependency_shape() {
        let s = build(InstrumentationVariant::AdotDistro, GrantStrategy::InlinePolicy);
        let g = s.graph().unwrap();
        // True dependencies.
        assert!(g.depends_on(ids::COLLECTOR_SERVICE, ids::API_KEY_SECRET));
        assert!(g.depends_on(ids::COLLECTOR_SERVICE, ids::INSTANCE_ROLE));
        assert!(g.depends_on(ids::COLLECTOR_SERVICE, ids::CONFMAP_DEPLOYMENT));
        assert!(g.depends_on(ids::INSTANCE_ROLE, ids::CONFMAP_BUCKET));
        assert!(g.depends_on(ids::INSTANCE_ROLE, ids::API_KEY_SECRET));
        assert!(g.depends_on(ids::HELLO_FUNCTION, ids::COLLECTOR_SERVICE));
        // No false ones.
        assert!(g.independent(ids::API_KEY_SECRET, ids::CONFMAP_BUCKET));
        assert_eq!(
            g.prerequisites(ids::HELLO_FUNCTION),
            [ids::COLLECTOR_SERVICE, "AdotHelloLambdaServiceRole"].into_iter().collect()
        );
        assert!(!g.depends_on(ids::CONFMAP_DEPLOYMENT, ids::API_KEY_SECRET));
        assert!(g.dependents(ids::HELLO_FUNCTION).is_empty());
    }

    #[test]
    fn redeclaring_an_id_is_rejected() {
        let s = build(InstrumentationVariant::OtelSdk, GrantStrategy::InlinePolicy);
        let mut stack = s.stack().clone();
        let err = Bucket::declare(&mut stack, ids::CONFMAP_BUCKET).unwrap_err();
        assert_eq!(err.kind(), "duplicate_declaration");
    }

    #[test]
    fn teardown_removes_bucket_and_secret() {
        let s = build(InstrumentationVariant::OtelSdk, GrantStrategy::ResourcePolicy);
        let t = s.synthesize().unwrap();
        for id in [ids::CONFMAP_BUCKET, ids::API_KEY_SECRET, ids::CONFMAP_DEPLOYMENT] {
            assert!(t.resources[id].is_deleted_on_teardown(), "{id} would be retained");
        }
        assert!(t.resources.values().all(|r| r.is_deleted_on_teardown()));

        // The object goes before its bucket.
        let g = s.graph().unwrap();
        assert!(g.retained().is_empty());
        let order: Vec<&str> = g.teardown_order().collect();
        let pos = |id: &str| order.iter().position(|x| *x == id).unwrap();
        assert!(pos(ids::CONFMAP_DEPLOYMENT) < pos(ids::CONFMAP_BUCKET));
        assert!(pos(ids::HELLO_FUNCTION) < pos(ids::COLLECTOR_SERVICE));
    }

    #[test]
    fn synthesis_is_deterministic() {
        for variant in [InstrumentationVariant::OtelSdk, InstrumentationVariant::AdotDistro] {
            for strategy in [GrantStrategy::InlinePolicy, GrantStrategy::ResourcePolicy] {
                let a = build(variant, strategy).synthesize().unwrap().to_json_pretty().unwrap();
                let b = build(variant, strategy).synthesize().unwrap().to_json_pretty().unwrap();
                assert_eq!(a, b);
            }
        }
    }

    #[test]
    fn grants_are_read_only_and_exact() {
        let s = build(InstrumentationVariant::OtelSdk, GrantStrategy::InlinePolicy);
        assert!(s.config_grant().is_read_only());
        assert_eq!(s.config_grant().actions().collect::<Vec<_>>(), vec![Action::S3GetObject]);
        assert_eq!(s.config_grant().scope(), &s.bucket().objects_scope());
        assert!(s.secret_grant().is_read_only());
        assert_eq!(s.secret_grant().principal(), &s.instance_role().principal());
    }
}
