//! Integration tests for configuration loading and load-time validation

mod common;

use common::create_test_config;
use dagrun::config::{find_config_file_from, parse_config, parse_config_file, validate_config};
use dagrun::error::{ConfigError, GraphError, RegistryError};
use dagrun::registry::TaskRegistry;
use dagrun::runner::TaskGraph;

#[test]
fn test_load_and_validate_full_config() {
    let yaml = r#"
name: pipeline
interpreter: [sh, -c]
on-failure: abort
defaults:
  model: small
environments:
  prod:
    model: large
tasks:
  bundle:
    description: Bundle the repository
    run: "tar cf ${archive} src"
    inputs: ["src/**"]
    outputs: [bundle.tar]
    env:
      archive: bundle.tar
    timeout: 5m
  "prompts:plan":
    run: "echo plan"
    deps: [bundle]
"#;
    let config = parse_config(yaml).unwrap();
    validate_config(&config).unwrap();

    let registry = TaskRegistry::from_config(&config).unwrap();
    assert_eq!(registry.len(), 2);

    let graph = TaskGraph::build(&registry).unwrap();
    assert_eq!(graph.dependencies_of("prompts:plan"), &["bundle".to_string()]);
}

#[test]
fn test_config_discovery_from_subdir() {
    let (temp_dir, config_path) = create_test_config(
        r#"
tasks:
  noop:
    run: "true"
"#,
    );
    let sub = temp_dir.path().join("nested");
    std::fs::create_dir(&sub).unwrap();

    let found = find_config_file_from(sub).unwrap();
    assert_eq!(found, config_path);
}

#[test]
fn test_parse_config_file_from_disk() {
    let (_temp_dir, config_path) = create_test_config(
        r#"
tasks:
  hello:
    run: echo hello
"#,
    );

    let config = parse_config_file(&config_path).unwrap();
    assert!(config.tasks.contains_key("hello"));
}

#[test]
fn test_unknown_dependency_is_load_time_error() {
    let config = parse_config(
        r#"
tasks:
  a:
    run: echo 1
    deps: [b]
"#,
    )
    .unwrap();
    validate_config(&config).unwrap();
    let registry = TaskRegistry::from_config(&config).unwrap();

    let result = TaskGraph::build(&registry);
    match result {
        Err(GraphError::UnknownDependency { task, dependency }) => {
            assert_eq!(task, "a");
            assert_eq!(dependency, "b");
        }
        other => panic!("expected UnknownDependency, got {:?}", other),
    }
}

#[test]
fn test_cycle_is_load_time_error() {
    let config = parse_config(
        r#"
tasks:
  a:
    run: echo 1
    deps: [b]
  b:
    run: echo 2
    deps: [a]
"#,
    )
    .unwrap();
    let registry = TaskRegistry::from_config(&config).unwrap();

    let result = TaskGraph::build(&registry);
    match result {
        Err(GraphError::CyclicDependency(cycle)) => {
            assert!(cycle.iter().any(|n| n == "a"));
            assert!(cycle.iter().any(|n| n == "b"));
        }
        other => panic!("expected CyclicDependency, got {:?}", other),
    }
}

#[test]
fn test_invalid_timeout_rejected() {
    let config = parse_config(
        r#"
tasks:
  slow:
    run: sleep 1
    timeout: soon
"#,
    )
    .unwrap();

    let result = validate_config(&config);
    assert!(matches!(result, Err(ConfigError::InvalidDuration(_))));
}

#[test]
fn test_registry_rejects_unknown_lookup() {
    let config = parse_config(
        r#"
tasks:
  real:
    run: "true"
"#,
    )
    .unwrap();
    let registry = TaskRegistry::from_config(&config).unwrap();

    assert!(matches!(
        registry.resolve("imaginary"),
        Err(RegistryError::UnknownTask(_))
    ));
}

#[test]
fn test_bad_template_syntax_rejected_at_load() {
    let config = parse_config(
        r#"
tasks:
  broken:
    run: "echo ${}"
"#,
    )
    .unwrap();

    let result = TaskRegistry::from_config(&config);
    assert!(result.is_err());
}
