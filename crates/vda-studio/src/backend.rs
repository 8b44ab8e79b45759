// SPDX-License-Identifier: Apache-2.0

//! Generated backend runtime scaffold.
//!
//! The scaffold is a dependency-free Rust binary over `std::net`, so the
//! runtime smoke check can compile and boot it without touching the
//! network. Templates use `__PLACEHOLDER__` substitution; the generated
//! sources never interpolate unescaped caller input outside of Rust
//! string literals produced with `{:?}`.

use crate::artifacts::{artifact, with_default};
use vda_model::{Confirmation, FileArtifact};

pub(crate) fn backend_runtime_artifacts(slug: &str, conf: &Confirmation) -> Vec<FileArtifact> {
    let base = format!("apps/{slug}/services/api");
    let entities = with_default(&conf.data_entities, "account");
    let workflows = with_default(&conf.core_workflows, "approve_request");

    let entity_list = rust_str_slice(&entities);
    let workflow_list = rust_str_slice(&workflows);
    let first_entity = entities[0].clone();

    let cargo_toml = format!(
        "[package]\nname = \"{slug}-api\"\nversion = \"0.1.0\"\nedition = \"2021\"\npublish = false\n\n[dependencies]\n",
    );

    let dockerfile = format!(
        "FROM rust:1.79-slim AS build\nWORKDIR /src\nCOPY . .\nRUN cargo build --release\n\nFROM debian:bookworm-slim\nCOPY --from=build /src/target/release/{slug}-api /usr/local/bin/{slug}-api\nENV PORT=8090\nEXPOSE 8090\nCMD [\"{slug}-api\"]\n",
    );

    let server_rs = SERVER_TEMPLATE.replace("__APP_NAME__", conf.app_name.trim());
    let entity_actions_rs = ENTITY_ACTIONS_TEMPLATE
        .replace("__ENTITY_LIST__", &entity_list)
        .replace("__WORKFLOW_LIST__", &workflow_list);
    let catalog_rs = CATALOG_TEMPLATE.replace("__FIRST_ENTITY__", &first_entity);

    let smoke_sh = format!(
        "#!/usr/bin/env sh\nset -eu\nBASE=\"${{BASE_URL:-http://127.0.0.1:8090}}\"\ncurl -fsS \"$BASE/health\"\ncurl -fsS \"$BASE/v1/tools\"\ncurl -fsS \"$BASE/v1/entities/{first_entity}/records\"\ncurl -fsS \"$BASE/v1/primitives/cms/pages\"\ncurl -fsS \"$BASE/v1/identity/providers\"\necho smoke-ok\n",
    );
    let behavior_sh = "#!/usr/bin/env sh\nset -eu\ncargo test --offline 2>/dev/null || cargo test\necho behavior-ok\n"
        .to_string();

    let mut files = vec![
        artifact(&format!("{base}/Cargo.toml"), "toml", cargo_toml),
        artifact(&format!("{base}/Dockerfile"), "dockerfile", dockerfile),
        artifact(&format!("{base}/src/main.rs"), "rust", MAIN_TEMPLATE.to_string()),
        artifact(&format!("{base}/src/runtime/mod.rs"), "rust", RUNTIME_MOD_TEMPLATE.to_string()),
        artifact(&format!("{base}/src/runtime/server.rs"), "rust", server_rs),
        artifact(
            &format!("{base}/src/runtime/entity_actions.rs"),
            "rust",
            entity_actions_rs,
        ),
        artifact(
            &format!("{base}/src/runtime/behavior_tests.rs"),
            "rust",
            BEHAVIOR_TESTS_TEMPLATE.to_string(),
        ),
        artifact(
            &format!("{base}/src/primitives/mod.rs"),
            "rust",
            PRIMITIVES_TEMPLATE.to_string(),
        ),
        artifact(&format!("{base}/src/identity/mod.rs"), "rust", IDENTITY_TEMPLATE.to_string()),
        artifact(
            &format!("{base}/src/identity/providers/mod.rs"),
            "rust",
            "pub mod auth0;\npub mod clerk;\npub mod supabase;\n".to_string(),
        ),
        artifact(
            &format!("{base}/src/identity/providers/auth0.rs"),
            "rust",
            provider_stub("auth0", "Auth0Provider"),
        ),
        artifact(
            &format!("{base}/src/identity/providers/clerk.rs"),
            "rust",
            provider_stub("clerk", "ClerkProvider"),
        ),
        artifact(
            &format!("{base}/src/identity/providers/supabase.rs"),
            "rust",
            provider_stub("supabase", "SupabaseProvider"),
        ),
        artifact(&format!("{base}/src/tools/mod.rs"), "rust", "pub mod catalog;\n".to_string()),
        artifact(&format!("{base}/src/tools/catalog.rs"), "rust", catalog_rs),
        artifact(
            &format!("{base}/src/tools/contracts.ts"),
            "typescript",
            TOOL_CONTRACTS_TS.to_string(),
        ),
        artifact(&format!("{base}/tests/smoke.sh"), "shell", smoke_sh),
        artifact(&format!("{base}/tests/behavior.sh"), "shell", behavior_sh),
    ];
    files.extend(integration_artifacts(&base, conf));
    files
}

fn integration_artifacts(base: &str, conf: &Confirmation) -> Vec<FileArtifact> {
    let mut mods = vec!["platform_adapter".to_string()];
    let mut files = vec![artifact(
        &format!("{base}/src/integrations/platform_adapter.rs"),
        "rust",
        PLATFORM_ADAPTER_TEMPLATE.to_string(),
    )];
    for integration in &conf.integrations {
        let module = module_ident(integration);
        if module.is_empty() || mods.contains(&format!("{module}_adapter")) {
            continue;
        }
        mods.push(format!("{module}_adapter"));
        files.push(artifact(
            &format!("{base}/src/integrations/{module}_adapter.rs"),
            "rust",
            INTEGRATION_ADAPTER_TEMPLATE
                .replace("__NAME__", integration.trim())
                .replace("__TYPE__", &type_ident(&module)),
        ));
    }
    let mod_rs = mods
        .iter()
        .map(|m| format!("pub mod {m};"))
        .collect::<Vec<_>>()
        .join("\n")
        + "\n";
    files.push(artifact(
        &format!("{base}/src/integrations/mod.rs"),
        "rust",
        mod_rs,
    ));
    files
}

fn rust_str_slice(items: &[String]) -> String {
    items
        .iter()
        .map(|item| format!("{:?}", item.trim()))
        .collect::<Vec<_>>()
        .join(", ")
}

fn module_ident(raw: &str) -> String {
    let mut out = String::new();
    for ch in raw.trim().to_lowercase().chars() {
        if ch.is_ascii_lowercase() || ch.is_ascii_digit() {
            out.push(ch);
        } else if !out.ends_with('_') {
            out.push('_');
        }
    }
    let out = out.trim_matches('_').to_string();
    if out.chars().next().is_some_and(|c| c.is_ascii_digit()) {
        format!("x{out}")
    } else {
        out
    }
}

fn type_ident(module: &str) -> String {
    module
        .split('_')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<String>()
        + "Adapter"
}

fn provider_stub(name: &str, type_name: &str) -> String {
    PROVIDER_TEMPLATE
        .replace("__NAME__", name)
        .replace("__TYPE__", type_name)
}

const MAIN_TEMPLATE: &str = r#"mod identity;
mod integrations;
mod primitives;
mod runtime;
mod tools;

fn main() {
    let port = std::env::var("PORT").unwrap_or_else(|_| "8090".to_string());
    runtime::server::serve(&port);
}
"#;

const RUNTIME_MOD_TEMPLATE: &str = r#"pub mod entity_actions;
pub mod server;

#[cfg(test)]
mod behavior_tests;
"#;

const SERVER_TEMPLATE: &str = r##"//! Minimal deterministic HTTP runtime for "__APP_NAME__".

use crate::identity;
use crate::primitives;
use crate::runtime::entity_actions;
use crate::tools::catalog;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};

pub fn serve(port: &str) {
    let listener =
        TcpListener::bind(format!("127.0.0.1:{port}")).expect("bind generated runtime port");
    println!("generated runtime listening on 127.0.0.1:{port}");
    for stream in listener.incoming() {
        match stream {
            Ok(stream) => {
                std::thread::spawn(move || handle(stream));
            }
            Err(err) => eprintln!("accept failed: {err}"),
        }
    }
}

fn handle(mut stream: TcpStream) {
    let Some((method, path)) = read_request_head(&mut stream) else {
        return;
    };
    let (status, body) = route(&method, &path);
    let reason = match status {
        200 => "OK",
        201 => "Created",
        404 => "Not Found",
        405 => "Method Not Allowed",
        _ => "OK",
    };
    let response = format!(
        "HTTP/1.1 {status} {reason}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    let _ = stream.write_all(response.as_bytes());
}

fn read_request_head(stream: &mut TcpStream) -> Option<(String, String)> {
    let mut data = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
        let n = stream.read(&mut buf).ok()?;
        if n == 0 {
            break;
        }
        data.extend_from_slice(&buf[..n]);
        if data.windows(4).any(|w| w == b"\r\n\r\n") || data.len() > 65536 {
            break;
        }
    }
    let head = String::from_utf8_lossy(&data);
    let mut parts = head.lines().next()?.split_whitespace();
    let method = parts.next()?.to_string();
    let path = parts.next()?.split('?').next()?.to_string();
    Some((method, path))
}

fn route(method: &str, path: &str) -> (u16, String) {
    match (method, path) {
        ("GET", "/health") => (200, r#"{"status":"ok"}"#.to_string()),
        ("GET", "/v1/tools") => (200, catalog::catalog_json()),
        ("POST", "/v1/workflows/execute") => (200, entity_actions::execute_workflow_json()),
        ("POST", "/v1/actions/execute") => (200, entity_actions::execute_action_json("default")),
        ("GET", "/v1/primitives/cms/pages") => (200, primitives::cms_pages_json()),
        ("GET", "/v1/primitives/blog/posts") => (200, primitives::blog_posts_json()),
        ("GET", "/v1/primitives/forum/threads") => (200, primitives::forum_threads_json()),
        ("GET", "/v1/primitives/email/messages") => (200, primitives::email_messages_json()),
        ("GET", "/v1/identity/providers") => (200, identity::providers_json()),
        ("POST", "/v1/identity/register") => (201, identity::register_json()),
        ("POST", "/v1/identity/login") => (200, identity::login_json()),
        ("POST", "/v1/identity/invitations") => (201, identity::invitation_json()),
        ("GET", "/v1/identity/roles") => (200, identity::roles_json()),
        ("POST", "/v1/identity/subdomains/claim") => (200, identity::subdomain_claim_json()),
        _ => route_entities(method, path),
    }
}

fn route_entities(method: &str, path: &str) -> (u16, String) {
    if let Some(rest) = path.strip_prefix("/v1/entities/") {
        if let Some(entity) = rest.strip_suffix("/records") {
            return match method {
                "GET" => (200, entity_actions::list_records_json(entity)),
                "POST" => (201, entity_actions::create_record_json(entity)),
                _ => (405, r#"{"error":"method_not_allowed"}"#.to_string()),
            };
        }
    }
    (404, r#"{"error":"not_found"}"#.to_string())
}
"##;

const ENTITY_ACTIONS_TEMPLATE: &str = r#"//! Entity CRUD lane and deterministic action execution.

use std::collections::HashMap;
use std::sync::{Mutex, OnceLock};

pub const ENTITIES: &[&str] = &[__ENTITY_LIST__];
pub const WORKFLOWS: &[&str] = &[__WORKFLOW_LIST__];

fn records() -> &'static Mutex<HashMap<String, Vec<String>>> {
    static RECORDS: OnceLock<Mutex<HashMap<String, Vec<String>>>> = OnceLock::new();
    RECORDS.get_or_init(|| {
        let mut seeded = HashMap::new();
        for entity in ENTITIES {
            seeded.insert((*entity).to_string(), vec![format!("{entity}-seed-1")]);
        }
        Mutex::new(seeded)
    })
}

pub fn list_records(entity: &str) -> Vec<String> {
    records()
        .lock()
        .map(|map| map.get(entity).cloned().unwrap_or_default())
        .unwrap_or_default()
}

pub fn create_record(entity: &str) -> String {
    let mut map = match records().lock() {
        Ok(map) => map,
        Err(poisoned) => poisoned.into_inner(),
    };
    let rows = map.entry(entity.to_string()).or_default();
    let id = format!("{entity}-{}", rows.len() + 1);
    rows.push(id.clone());
    id
}

pub fn list_records_json(entity: &str) -> String {
    let rows = list_records(entity);
    let quoted: Vec<String> = rows.iter().map(|r| format!("{r:?}")).collect();
    format!(
        "{{\"entity\":{:?},\"records\":[{}]}}",
        entity,
        quoted.join(",")
    )
}

pub fn create_record_json(entity: &str) -> String {
    let id = create_record(entity);
    format!("{{\"entity\":{entity:?},\"record_id\":{id:?},\"status\":\"created\"}}")
}

pub fn execute_action_json(action: &str) -> String {
    format!("{{\"action\":{action:?},\"status\":\"accepted\"}}")
}

pub fn execute_workflow_json() -> String {
    let quoted: Vec<String> = WORKFLOWS.iter().map(|w| format!("{w:?}")).collect();
    format!(
        "{{\"status\":\"accepted\",\"workflows\":[{}]}}",
        quoted.join(",")
    )
}
"#;

const BEHAVIOR_TESTS_TEMPLATE: &str = r#"use crate::runtime::entity_actions;

#[test]
fn seeded_entities_list_and_grow() {
    for entity in entity_actions::ENTITIES {
        let before = entity_actions::list_records(entity).len();
        assert!(before >= 1, "entity {entity} must be seeded");
        let id = entity_actions::create_record(entity);
        assert!(id.starts_with(entity));
        let after = entity_actions::list_records(entity).len();
        assert_eq!(after, before + 1);
    }
}

#[test]
fn workflow_execution_is_accepted() {
    let payload = entity_actions::execute_workflow_json();
    assert!(payload.contains("\"accepted\""));
    for workflow in entity_actions::WORKFLOWS {
        let payload = entity_actions::execute_action_json(workflow);
        assert!(payload.contains("\"accepted\""));
    }
}
"#;

const PRIMITIVES_TEMPLATE: &str = r##"//! Seeded product primitives: CMS, blog, forum, email.

pub fn cms_pages_json() -> String {
    r#"{"pages":[{"slug":"home","title":"Home","body":"Generated CMS placeholder content."}]}"#
        .to_string()
}

pub fn blog_posts_json() -> String {
    r#"{"posts":[{"slug":"hello-world","title":"Hello World","excerpt":"Generated blog starter post."}]}"#
        .to_string()
}

pub fn forum_threads_json() -> String {
    r#"{"threads":[{"id":"thread-1","title":"Welcome","author":"system"}]}"#.to_string()
}

pub fn email_messages_json() -> String {
    r#"{"messages":[{"id":"email-1","subject":"Welcome to Violet","status":"queued"}]}"#.to_string()
}
"##;

const IDENTITY_TEMPLATE: &str = r##"//! End-user identity lifecycle stubs. Control-plane tokens are a separate
//! credential space from generated-app sessions.

pub mod providers;

pub fn providers_json() -> String {
    r#"{"providers":["auth0","clerk","supabase"]}"#.to_string()
}

pub fn register_json() -> String {
    r#"{"status":"registered","user_id":"user-1"}"#.to_string()
}

pub fn login_json() -> String {
    r#"{"status":"ok","session":"session-1"}"#.to_string()
}

pub fn invitation_json() -> String {
    r#"{"status":"invited","invitation_id":"invite-1"}"#.to_string()
}

pub fn roles_json() -> String {
    r#"{"roles":["admin","operator","member"]}"#.to_string()
}

pub fn subdomain_claim_json() -> String {
    r#"{"status":"claimed","subdomain":"generated-app"}"#.to_string()
}
"##;

const PROVIDER_TEMPLATE: &str = r#"pub struct __TYPE__;

impl __TYPE__ {
    pub const NAME: &'static str = "__NAME__";

    pub fn authorize_url(&self, redirect: &str) -> String {
        format!("https://__NAME__.example/authorize?redirect_uri={redirect}")
    }
}
"#;

const CATALOG_TEMPLATE: &str = r##"//! Machine-readable tool catalog for the generated runtime.

pub fn catalog_json() -> String {
    r#"{"tools":[
  {"name":"entity.create_record","method":"POST","path":"/v1/entities/__FIRST_ENTITY__/records"},
  {"name":"entity.list_records","method":"GET","path":"/v1/entities/__FIRST_ENTITY__/records"},
  {"name":"workflow.execute","method":"POST","path":"/v1/workflows/execute"},
  {"name":"action.execute","method":"POST","path":"/v1/actions/execute"},
  {"name":"cms.pages","method":"GET","path":"/v1/primitives/cms/pages"},
  {"name":"identity.providers","method":"GET","path":"/v1/identity/providers"}
]}"#
    .to_string()
}
"##;

const TOOL_CONTRACTS_TS: &str = r#"export interface ToolDescriptor {
  name: string;
  method: "GET" | "POST";
  path: string;
}

export interface ToolCatalog {
  tools: ToolDescriptor[];
}

export interface ActionExecuteResponse {
  action: string;
  status: "accepted";
}
"#;

const PLATFORM_ADAPTER_TEMPLATE: &str = r#"//! Seam between the generated runtime and the deterministic control plane.

pub struct PlatformAdapter {
    pub base_url: String,
}

impl PlatformAdapter {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.to_string(),
        }
    }

    pub fn health_path(&self) -> String {
        format!("{}/v1/health", self.base_url.trim_end_matches('/'))
    }
}
"#;

const INTEGRATION_ADAPTER_TEMPLATE: &str = r#"//! Stub adapter for the "__NAME__" integration.

pub struct __TYPE__ {
    pub api_key: Option<String>,
}

impl __TYPE__ {
    pub fn new(api_key: Option<String>) -> Self {
        Self { api_key }
    }

    pub fn configured(&self) -> bool {
        self.api_key.as_deref().is_some_and(|key| !key.is_empty())
    }
}
"#;

#[cfg(test)]
mod tests {
    use super::{backend_runtime_artifacts, module_ident, type_ident};
    use vda_model::Confirmation;

    #[test]
    fn scaffold_contains_runtime_and_tool_files() {
        let conf = Confirmation {
            data_entities: vec!["account".to_string()],
            core_workflows: vec!["approve_record".to_string()],
            integrations: vec!["stripe".to_string(), "Slack".to_string()],
            ..Confirmation::default()
        };
        let files = backend_runtime_artifacts("demo", &conf);
        let paths: Vec<&str> = files.iter().map(|f| f.path.as_str()).collect();
        assert!(paths.contains(&"apps/demo/services/api/Cargo.toml"));
        assert!(paths.contains(&"apps/demo/services/api/src/runtime/server.rs"));
        assert!(paths.contains(&"apps/demo/services/api/src/integrations/stripe_adapter.rs"));
        assert!(paths.contains(&"apps/demo/services/api/src/integrations/slack_adapter.rs"));

        let entity_actions = files
            .iter()
            .find(|f| f.path.ends_with("entity_actions.rs"))
            .expect("entity actions artifact");
        assert!(entity_actions.content.contains("\"account\""));
    }

    #[test]
    fn module_identifiers_are_sanitized() {
        assert_eq!(module_ident("Google Sheets"), "google_sheets");
        assert_eq!(module_ident("3cx"), "x3cx");
        assert_eq!(type_ident("google_sheets"), "GoogleSheetsAdapter");
    }
}
