//! Integration tests for preflight and topology synthesis.

use std::fs;
use std::path::Path;

use duo_iac::{
    CloudAssembly, Declaration, PreflightValidator, ProvisioningBackend, RecordingBackend,
    ResourceKind, Settings, StackProfile, TemplateFormat, TemplateSynthesizer, TopologyProvisioner,
    CLUSTER_NAME_OUTPUT, LOAD_BALANCER_URL_OUTPUT, REQUIRED_SETTINGS,
};
use tempfile::tempdir;

fn app_dir_with_dockerfile(root: &Path) -> std::path::PathBuf {
    let app = root.join("duolingo");
    fs::create_dir_all(&app).unwrap();
    fs::write(app.join("Dockerfile"), "FROM node:20-alpine\nEXPOSE 3000\n").unwrap();
    fs::write(app.join("package.json"), "{\"name\":\"duolingo\"}").unwrap();
    app
}

fn full_settings() -> Settings {
    Settings::from_pairs(REQUIRED_SETTINGS.iter().map(|s| (s.name, "set")))
}

#[test]
fn test_every_subset_of_missing_settings_is_named() {
    let dir = tempdir().unwrap();
    let app = app_dir_with_dockerfile(dir.path());
    let validator = PreflightValidator::new(&app);

    for mask in 0u32..(1 << REQUIRED_SETTINGS.len()) {
        let settings = Settings::from_pairs(
            REQUIRED_SETTINGS
                .iter()
                .enumerate()
                .filter(|(i, _)| mask & (1 << *i) == 0)
                .map(|(_, s)| (s.name, "value")),
        );
        let report = validator.validate(&settings);

        let missing: Vec<_> = REQUIRED_SETTINGS
            .iter()
            .enumerate()
            .filter(|(i, _)| mask & (1 << *i) != 0)
            .map(|(_, s)| s.name)
            .collect();

        assert_eq!(report.passed, missing.is_empty(), "mask {mask:#b}");
        let diagnostics = report.diagnostics();
        for name in &missing {
            assert!(
                diagnostics.contains(&format!("Missing env variable: {}", name)),
                "{name} not reported for mask {mask:#b}"
            );
        }
        assert_eq!(report.failures().count(), missing.len());
    }
}

#[test]
fn test_validation_is_idempotent() {
    let dir = tempdir().unwrap();
    let validator = PreflightValidator::new(dir.path().join("duolingo"));
    let settings = Settings::from_pairs([("DATABASE_URL", "pg"), ("CLERK_SECRET_KEY", "")]);

    let first = validator.validate(&settings);
    let second = validator.validate(&settings);

    assert_eq!(first, second);
    assert!(!first.passed);
}

#[test]
fn test_recorded_topology_shape() {
    let dir = tempdir().unwrap();
    let app = app_dir_with_dockerfile(dir.path());
    let settings = full_settings();
    assert!(PreflightValidator::new(&app).validate(&settings).passed);

    let mut backend = RecordingBackend::new();
    let stack = TopologyProvisioner::new(StackProfile::default(), &app)
        .provision(&settings, &mut backend)
        .unwrap();

    for kind in [
        ResourceKind::ImageAsset,
        ResourceKind::Cluster,
        ResourceKind::TaskDefinition,
        ResourceKind::LoadBalancer,
        ResourceKind::TargetGroup,
        ResourceKind::Listener,
        ResourceKind::Service,
    ] {
        assert_eq!(backend.count(kind), 1, "expected exactly one {kind}");
    }

    let mut container_port = None;
    let mut target_port = None;
    for declaration in backend.declarations() {
        match declaration {
            Declaration::TaskDefinition(task) => {
                assert_eq!(task.containers.len(), 1);
                container_port = task.containers[0].primary_port();
                assert_eq!(task.containers[0].environment["NODE_ENV"], "production");
            }
            Declaration::TargetGroup(tg) => {
                target_port = Some(tg.port);
                assert_eq!(tg.health_check.path, "/");
                assert_eq!(tg.health_check.healthy_http_codes, "200");
            }
            Declaration::Listener { spec, target_group, .. } => {
                assert_eq!(spec.port, 80);
                assert_eq!(target_group, &stack.target_group.logical_id);
            }
            Declaration::Service { spec, target_group, .. } => {
                assert_eq!(spec.desired_count, 1);
                assert!(spec.assign_public_ip);
                assert_eq!(target_group, &stack.target_group.logical_id);
            }
            _ => {}
        }
    }
    assert_eq!(container_port, Some(3000));
    assert_eq!(container_port, target_port);

    let cluster_name = backend.resolve(&stack.output(CLUSTER_NAME_OUTPUT).unwrap().value).unwrap();
    assert_eq!(cluster_name, "duolingo-cdk-cluster");

    let url = backend
        .resolve(&stack.output(LOAD_BALANCER_URL_OUTPUT).unwrap().value)
        .unwrap();
    let dns = backend.resolve(&stack.load_balancer.attr("DNSName")).unwrap();
    assert_eq!(url, format!("http://{}", dns));
    assert!(!url.trim_start_matches("http://").contains('/'));
    assert_eq!(backend.outputs().len(), 2);
}

#[test]
fn test_missing_default_network_fails_provisioning() {
    let mut backend = RecordingBackend::new().without_default_network();
    let result = TopologyProvisioner::new(StackProfile::default(), "/srv/duolingo")
        .provision(&full_settings(), &mut backend);

    assert!(result.is_err());
    assert_eq!(backend.count(ResourceKind::Cluster), 0);
}

#[test]
fn test_synthesized_template() {
    let dir = tempdir().unwrap();
    let app = app_dir_with_dockerfile(dir.path());
    let profile = StackProfile::default().with_account(Some("123456789012".to_string()));

    let mut synth = TemplateSynthesizer::new(profile.clone());
    TopologyProvisioner::new(profile, &app)
        .provision(&full_settings(), &mut synth)
        .unwrap();

    let template = synth.template();
    for resource_type in [
        "AWS::ECS::Cluster",
        "AWS::ECS::TaskDefinition",
        "AWS::ECS::Service",
        "AWS::ElasticLoadBalancingV2::LoadBalancer",
        "AWS::ElasticLoadBalancingV2::Listener",
        "AWS::ElasticLoadBalancingV2::TargetGroup",
    ] {
        assert_eq!(template.resources_of_type(resource_type).count(), 1, "{resource_type}");
    }

    let (_, tg) = template
        .resources_of_type("AWS::ElasticLoadBalancingV2::TargetGroup")
        .next()
        .unwrap();
    assert_eq!(tg["Properties"]["Port"], 3000);
    assert_eq!(tg["Properties"]["TargetType"], "ip");
    assert_eq!(tg["Properties"]["HealthCheckPath"], "/");
    assert_eq!(tg["Properties"]["Matcher"]["HttpCode"], "200");

    let (_, service) = template.resources_of_type("AWS::ECS::Service").next().unwrap();
    assert_eq!(service["Properties"]["DesiredCount"], 1);
    assert_eq!(
        service["Properties"]["NetworkConfiguration"]["AwsvpcConfiguration"]["AssignPublicIp"],
        "ENABLED"
    );
    assert_eq!(service["Properties"]["LoadBalancers"][0]["ContainerPort"], 3000);

    let url = &template.outputs[LOAD_BALANCER_URL_OUTPUT]["Value"]["Fn::Join"][1];
    assert_eq!(url[0], "http://");
    assert_eq!(url[1]["Fn::GetAtt"][1], "DNSName");
    assert_eq!(url.as_array().unwrap().len(), 2);

    let out = dir.path().join("cdk.out");
    let assembly = CloudAssembly::write(&out, &synth, TemplateFormat::Json).unwrap();
    let written: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&assembly.template).unwrap()).unwrap();
    assert_eq!(written["Outputs"][CLUSTER_NAME_OUTPUT]["Value"]["Ref"], "DuolingoCluster");
}

#[test]
fn test_backend_is_object_safe() {
    let mut backends: Vec<Box<dyn ProvisioningBackend>> = vec![
        Box::new(RecordingBackend::new()),
        Box::new(TemplateSynthesizer::new(StackProfile::default())),
    ];
    for backend in backends.iter_mut() {
        TopologyProvisioner::new(StackProfile::default(), "/srv/duolingo")
            .provision(&full_settings(), backend.as_mut())
            .unwrap();
    }
}
