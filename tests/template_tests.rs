//! Exercises `TemplateEngine` against the in-memory port fakes: every tag
//! family the grammar supports, the output-cache/parameter-store
//! fallback, and the same-step Terraform output-to-HCL rewrite.

mod support;

use infralib_agent::model::{ApprovePolicy, Config, Module, ModuleVersion, Source, Step, StepType};
use infralib_agent::ports::ParameterType;
use infralib_agent::template::{TemplateContext, TemplateEngine};
use std::collections::HashMap;
use support::{FakeObjectStore, FakeParameterStore};

fn sample_config() -> Config {
    Config {
        sources: vec![Source {
            url: "https://git.example.com/org/repo".into(),
            version: None,
        }],
        base_config: None,
        prefix: "demo".into(),
        version: None,
        agent_version: None,
        schedule: None,
        steps: vec![Step {
            name: "net".into(),
            step_type: StepType::Terraform,
            workspace: "dev".into(),
            approve: ApprovePolicy::Minor,
            version: None,
            vpc: None,
            kubernetes_cluster_name: None,
            argocd_namespace: None,
            provider: None,
            modules: vec![Module {
                name: "main".into(),
                source: "aws/vpc".into(),
                version: Some(ModuleVersion::Stable),
                http_username: None,
                http_password: None,
                public: false,
                inputs: Default::default(),
                files: vec![],
            }],
            files: vec![],
            before: vec![],
            after: vec![],
        }],
    }
}

fn engine<'a>(
    config: &'a Config,
    object_store: &'a FakeObjectStore,
    parameter_store: &'a FakeParameterStore,
    versions: &'a HashMap<(String, String), ModuleVersion>,
    current_step: Option<&'a str>,
    current_step_is_terraform: bool,
) -> TemplateEngine<'a> {
    TemplateEngine::new(
        TemplateContext {
            config,
            account_id: "111122223333",
            resolved_versions: versions,
            current_step,
            current_step_is_terraform,
        },
        object_store,
        parameter_store,
    )
}

#[tokio::test]
async fn config_tag_resolves_a_dotted_path() {
    let config = sample_config();
    let object_store = FakeObjectStore::new();
    let parameter_store = FakeParameterStore::new();
    let versions = HashMap::new();
    let mut eng = engine(&config, &object_store, &parameter_store, &versions, None, false);

    let rendered = eng.render("prefix is {{ config.prefix }}").await.unwrap();
    assert_eq!(rendered, "prefix is demo");
}

#[tokio::test]
async fn agent_accountid_tag_resolves_from_context() {
    let config = sample_config();
    let object_store = FakeObjectStore::new();
    let parameter_store = FakeParameterStore::new();
    let versions = HashMap::new();
    let mut eng = engine(&config, &object_store, &parameter_store, &versions, None, false);

    let rendered = eng.render("{{ agent.accountid }}").await.unwrap();
    assert_eq!(rendered, "111122223333");
}

#[tokio::test]
async fn agent_version_tag_resolves_from_the_resolved_versions_map() {
    let config = sample_config();
    let object_store = FakeObjectStore::new();
    let parameter_store = FakeParameterStore::new();
    let mut versions = HashMap::new();
    versions.insert(("net".to_string(), "main".to_string()), ModuleVersion::Exact(semver::Version::new(1, 4, 0)));
    let mut eng = engine(&config, &object_store, &parameter_store, &versions, Some("net"), true);

    let rendered = eng.render("{{ agent.version.net.main }}").await.unwrap();
    assert_eq!(rendered, "v1.4.0");
}

#[tokio::test]
async fn output_lookup_falls_back_to_parameter_store_when_output_cache_has_no_entry() {
    let config = sample_config();
    let object_store = FakeObjectStore::new();
    let parameter_store = FakeParameterStore::new();
    parameter_store.seed("/infralib/demo-downstream-main/vpc_id", "vpc-0abc", ParameterType::String);
    let versions = HashMap::new();
    // "net" is not the current step, so this is a cross-step lookup that
    // resolves against the output cache (miss) and then the parameter store.
    let mut eng = engine(&config, &object_store, &parameter_store, &versions, Some("other"), true);

    let rendered = eng.render("{{ output.downstream.main.vpc_id }}").await.unwrap();
    assert_eq!(rendered, "vpc-0abc");
}

#[tokio::test]
async fn output_lookup_prefers_the_cached_terraform_output_blob() {
    let config = sample_config();
    let object_store = FakeObjectStore::new();
    object_store.seed(
        "demo-net/dev/terraform-output.json",
        br#"{"main.vpc_id": {"value": "vpc-cached"}}"#.to_vec(),
    );
    let parameter_store = FakeParameterStore::new();
    let versions = HashMap::new();
    let mut eng = engine(&config, &object_store, &parameter_store, &versions, Some("other"), true);

    let rendered = eng.render("{{ output.net.main.vpc_id }}").await.unwrap();
    assert_eq!(rendered, "vpc-cached");
}

#[tokio::test]
async fn same_step_terraform_output_rewrites_to_an_hcl_module_reference() {
    let config = sample_config();
    let object_store = FakeObjectStore::new();
    let parameter_store = FakeParameterStore::new();
    let versions = HashMap::new();
    // current_step == "net" and the step is terraform, so this must not hit
    // the object store or parameter store at all: it rewrites in place.
    let mut eng = engine(&config, &object_store, &parameter_store, &versions, Some("net"), true);

    let rendered = eng.render("{{ output.net.main.vpc_id }}").await.unwrap();
    assert_eq!(rendered, "module.main.vpc_id");
    assert!(!object_store.contains("demo-net/dev/terraform-output.json"));
}

#[tokio::test]
async fn ssm_custom_tag_resolves_a_free_standing_parameter() {
    let config = sample_config();
    let object_store = FakeObjectStore::new();
    let parameter_store = FakeParameterStore::new();
    parameter_store.seed("shared/db-password", "hunter2", ParameterType::String);
    let versions = HashMap::new();
    let mut eng = engine(&config, &object_store, &parameter_store, &versions, None, false);

    let rendered = eng.render("{{ ssm-custom.shared/db-password }}").await.unwrap();
    assert_eq!(rendered, "hunter2");
}

#[tokio::test]
async fn output_index_range_joins_a_stringlist_parameter_with_commas() {
    let config = sample_config();
    let object_store = FakeObjectStore::new();
    let parameter_store = FakeParameterStore::new();
    parameter_store.seed(
        "/infralib/demo-downstream-main/subnets",
        "subnet-a,subnet-b,subnet-c",
        ParameterType::StringList,
    );
    let versions = HashMap::new();
    let mut eng = engine(&config, &object_store, &parameter_store, &versions, Some("other"), true);

    let rendered = eng.render("{{ output.downstream.main.subnets[0-1] }}").await.unwrap();
    assert_eq!(rendered, "subnet-a,subnet-b");
}

#[tokio::test]
async fn toutput_resolves_by_module_type_within_the_current_step() {
    let config = sample_config();
    let object_store = FakeObjectStore::new();
    object_store.seed(
        "demo-net/dev/terraform-output.json",
        br#"{"main.id": {"value": "vpc-123"}}"#.to_vec(),
    );
    let parameter_store = FakeParameterStore::new();
    let versions = HashMap::new();
    let mut eng = engine(&config, &object_store, &parameter_store, &versions, Some("net"), false);

    let rendered = eng.render("{{ toutput.vpc.id }}").await.unwrap();
    assert_eq!(rendered, "vpc-123");
}

#[tokio::test]
async fn tmodule_resolves_the_module_name_for_a_type() {
    let config = sample_config();
    let object_store = FakeObjectStore::new();
    let parameter_store = FakeParameterStore::new();
    let versions = HashMap::new();
    let mut eng = engine(&config, &object_store, &parameter_store, &versions, Some("net"), true);

    let rendered = eng.render("{{ tmodule.vpc }}").await.unwrap();
    assert_eq!(rendered, "main");
}

#[tokio::test]
async fn backtick_literal_escape_is_emitted_verbatim() {
    let config = sample_config();
    let object_store = FakeObjectStore::new();
    let parameter_store = FakeParameterStore::new();
    let versions = HashMap::new();
    let mut eng = engine(&config, &object_store, &parameter_store, &versions, None, false);

    let rendered = eng.render("{{ `literal {{ config.prefix }} text` }}").await.unwrap();
    assert_eq!(rendered, "literal {{ config.prefix }} text");
}

#[tokio::test]
async fn unknown_output_parameter_is_a_core_error() {
    let config = sample_config();
    let object_store = FakeObjectStore::new();
    let parameter_store = FakeParameterStore::new();
    let versions = HashMap::new();
    let mut eng = engine(&config, &object_store, &parameter_store, &versions, Some("other"), true);

    let err = eng.render("{{ output.downstream.main.missing }}").await.unwrap_err();
    assert!(matches!(err, infralib_agent::errors::CoreError::NotFound(_)));
}

#[tokio::test]
async fn output_optional_tag_resolves_to_empty_string_when_missing() {
    let config = sample_config();
    let object_store = FakeObjectStore::new();
    let parameter_store = FakeParameterStore::new();
    let versions = HashMap::new();
    let mut eng = engine(&config, &object_store, &parameter_store, &versions, Some("other"), true);

    let rendered = eng.render("[{{ output-optional.downstream.main.missing }}]").await.unwrap();
    assert_eq!(rendered, "[]");
}
