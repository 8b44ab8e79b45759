// SPDX-License-Identifier: Apache-2.0

//! Live preview documents and the stock web/mobile runtime assets.
//!
//! A generated file wins over the stock template whenever its path ends in
//! `clients/<client>/<asset>`, so jobs that shipped their own runtime keep
//! serving it after rehydration.

use crate::artifacts::{artifact, fallback, with_default};
use serde::Serialize;
use vda_model::{Confirmation, FileArtifact, Job};

#[derive(Debug, Serialize)]
pub(crate) struct PreviewModel {
    pub job_id: String,
    pub app_name: String,
    pub domain: String,
    pub plan: String,
    pub region: String,
    pub deployment: String,
    pub primary_users: Vec<String>,
    pub workflows: Vec<String>,
    pub entities: Vec<String>,
    pub integrations: Vec<String>,
    pub workload_count: usize,
    pub file_count: usize,
    pub terminal_count: usize,
    pub console_count: usize,
}

pub(crate) fn preview_model_from_job(job: &Job) -> PreviewModel {
    PreviewModel {
        job_id: job.job_id.clone(),
        app_name: fallback(&job.confirmation.app_name, "Generated App").to_string(),
        domain: fallback(&job.confirmation.domain, "saas").to_string(),
        plan: fallback(&job.confirmation.plan, "starter").to_string(),
        region: fallback(&job.confirmation.region, "us-east-1").to_string(),
        deployment: fallback(&job.confirmation.deployment_target, "managed").to_string(),
        primary_users: with_default(&job.confirmation.primary_users, "admin"),
        workflows: with_default(&job.confirmation.core_workflows, "approve_request"),
        entities: with_default(&job.confirmation.data_entities, "account"),
        integrations: with_default(&job.confirmation.integrations, "none"),
        workload_count: job.workload.len(),
        file_count: job.files.len(),
        terminal_count: job.terminal_logs.len(),
        console_count: job.console_logs.len(),
    }
}

fn preview_model_from_confirmation(conf: &Confirmation) -> PreviewModel {
    PreviewModel {
        job_id: "local-preview".to_string(),
        app_name: fallback(&conf.app_name, "Generated App").to_string(),
        domain: fallback(&conf.domain, "saas").to_string(),
        plan: fallback(&conf.plan, "starter").to_string(),
        region: fallback(&conf.region, "us-east-1").to_string(),
        deployment: fallback(&conf.deployment_target, "managed").to_string(),
        primary_users: with_default(&conf.primary_users, "admin"),
        workflows: with_default(&conf.core_workflows, "approve_request"),
        entities: with_default(&conf.data_entities, "account"),
        integrations: with_default(&conf.integrations, "none"),
        workload_count: conf.core_workflows.len() + 6,
        file_count: conf.core_workflows.len() + conf.data_entities.len() + 6,
        terminal_count: 6,
        console_count: 6,
    }
}

/// Normalize the requested client; anything that is not `mobile` is `web`.
pub(crate) fn runtime_client(client: &str) -> &'static str {
    if client.trim().eq_ignore_ascii_case("mobile") {
        "mobile"
    } else {
        "web"
    }
}

pub(crate) fn runtime_content_type(asset: &str) -> &'static str {
    let lower = asset.to_lowercase();
    if lower.ends_with(".css") {
        "text/css; charset=utf-8"
    } else if lower.ends_with(".js") {
        "application/javascript; charset=utf-8"
    } else {
        "text/html; charset=utf-8"
    }
}

/// Preview document referencing the runtime assets under the job
/// namespace with an `updated_at` cache buster.
pub(crate) fn render_preview_document(job: &Job, client: &str, token: &str) -> String {
    let mode = runtime_client(client);
    let client_name = if mode == "mobile" { "Mobile" } else { "Web" };
    let updated_nanos = job
        .updated_at
        .and_then(|t| t.timestamp_nanos_opt())
        .unwrap_or(0);
    let mut query = format!("v={updated_nanos}");
    if !token.trim().is_empty() {
        query.push_str(&format!("&token={}", query_encode(token.trim())));
    }
    let base = format!("/v1/studio/jobs/{}/runtime/{mode}", job.job_id);
    preview_document(
        fallback(&job.confirmation.app_name, "Generated App"),
        client_name,
        &format!("{base}/app.css?{query}"),
        &format!("{base}/app.js?{query}"),
    )
}

/// Asset lookup: a generated file first, then the stock templates.
pub(crate) fn render_runtime_asset(
    job: &Job,
    client: &str,
    asset: &str,
) -> Option<(String, Vec<u8>)> {
    let mode = runtime_client(client);
    let mut name = asset.trim().trim_matches('/').to_string();
    if name.is_empty() {
        name = "index.html".to_string();
    }

    if let Some(found) = lookup_generated_asset(&job.files, mode, &name) {
        return Some(found);
    }

    let model = preview_model_from_job(job);
    match name.as_str() {
        "index.html" => Some((
            "text/html; charset=utf-8".to_string(),
            render_preview_document(job, mode, "").into_bytes(),
        )),
        "app.css" => {
            let css = if mode == "mobile" { MOBILE_CSS } else { WEB_CSS };
            Some(("text/css; charset=utf-8".to_string(), css.as_bytes().to_vec()))
        }
        "app.js" => {
            let js = if mode == "mobile" {
                mobile_runtime_js(&model)
            } else {
                web_runtime_js(&model)
            };
            Some((
                "application/javascript; charset=utf-8".to_string(),
                js.into_bytes(),
            ))
        }
        _ => None,
    }
}

fn lookup_generated_asset(
    files: &[FileArtifact],
    mode: &str,
    asset: &str,
) -> Option<(String, Vec<u8>)> {
    let suffix = format!("clients/{mode}/{asset}");
    files.iter().find(|f| f.path.ends_with(&suffix)).map(|f| {
        (
            runtime_content_type(asset).to_string(),
            f.content.as_bytes().to_vec(),
        )
    })
}

/// The standalone web/mobile client artifacts baked into every job.
pub(crate) fn runtime_source_artifacts(slug: &str, conf: &Confirmation) -> Vec<FileArtifact> {
    let base = format!("apps/{slug}/clients");
    let model = preview_model_from_confirmation(conf);
    let app_name = fallback(&conf.app_name, "Generated App");
    vec![
        artifact(
            &format!("{base}/web/index.html"),
            "html",
            preview_document(app_name, "Web", "./app.css", "./app.js"),
        ),
        artifact(&format!("{base}/web/app.css"), "css", WEB_CSS.to_string()),
        artifact(
            &format!("{base}/web/app.js"),
            "javascript",
            web_runtime_js(&model),
        ),
        artifact(
            &format!("{base}/mobile/index.html"),
            "html",
            preview_document(app_name, "Mobile", "./app.css", "./app.js"),
        ),
        artifact(&format!("{base}/mobile/app.css"), "css", MOBILE_CSS.to_string()),
        artifact(
            &format!("{base}/mobile/app.js"),
            "javascript",
            mobile_runtime_js(&model),
        ),
    ]
}

fn preview_document(app_name: &str, client_name: &str, css_url: &str, js_url: &str) -> String {
    PREVIEW_DOCUMENT
        .replace("__APP_NAME__", &html_escape(app_name))
        .replace("__CLIENT_NAME__", client_name)
        .replace("__CSS_URL__", css_url)
        .replace("__JS_URL__", js_url)
}

fn web_runtime_js(model: &PreviewModel) -> String {
    let payload = serde_json::to_string(model).unwrap_or_else(|_| "{}".to_string());
    WEB_RUNTIME_JS.replace("__MODEL_JSON__", &payload)
}

fn mobile_runtime_js(model: &PreviewModel) -> String {
    let payload = serde_json::to_string(model).unwrap_or_else(|_| "{}".to_string());
    MOBILE_RUNTIME_JS.replace("__MODEL_JSON__", &payload)
}

fn html_escape(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn query_encode(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char);
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

const PREVIEW_DOCUMENT: &str = r#"<!doctype html>
<html lang="en">
<head>
  <meta charset="utf-8" />
  <meta name="viewport" content="width=device-width, initial-scale=1" />
  <title>__APP_NAME__ __CLIENT_NAME__ Runtime</title>
  <link rel="stylesheet" href="__CSS_URL__" />
</head>
<body>
  <div id="app"></div>
  <script src="__JS_URL__" defer></script>
</body>
</html>"#;

const WEB_RUNTIME_JS: &str = r#"(function () {
  const model = __MODEL_JSON__;
  const state = {
    view: "dashboard",
    entities: model.entities.map((name, idx) => ({ id: idx + 1, name, status: "active" })),
    workflows: model.workflows.map((name, idx) => ({ id: idx + 1, name, status: "ready" })),
  };

  const root = document.getElementById("app");
  if (!root) return;

  function esc(v) {
    return String(v)
      .replaceAll("&", "&amp;")
      .replaceAll("<", "&lt;")
      .replaceAll(">", "&gt;")
      .replaceAll('"', "&quot;")
      .replaceAll("'", "&#39;");
  }

  function navButton(id, label) {
    return '<button class="tab ' + (state.view === id ? 'active' : '') + '" data-view="' + id + '">' + label + '</button>';
  }

  function metrics() {
    return [
      ["Workload", model.workload_count],
      ["Files", model.file_count],
      ["Terminal", model.terminal_count],
      ["Console", model.console_count],
    ].map(([k, v]) => '<div class="metric"><div class="k">' + esc(k) + '</div><div class="v">' + esc(v) + '</div></div>').join("");
  }

  function dashboardView() {
    return '<section class="panel"><h2>Runtime Overview</h2><div class="metrics">' + metrics() + '</div><div class="hint">Click around to validate generated client structure before deployment.</div></section>';
  }

  function entitiesView() {
    const rows = state.entities.map((e) => '<tr><td>' + esc(e.id) + '</td><td>' + esc(e.name) + '</td><td>' + esc(e.status) + '</td></tr>').join("");
    return '<section class="panel"><h2>Entities</h2><table><thead><tr><th>ID</th><th>Name</th><th>Status</th></tr></thead><tbody>' + rows + '</tbody></table></section>';
  }

  function workflowsView() {
    const items = state.workflows.map((wf) => '<div class="item"><strong>' + esc(wf.name) + '</strong><span>' + esc(wf.status) + '</span></div>').join("");
    return '<section class="panel"><h2>Workflows</h2><div class="list">' + items + '</div></section>';
  }

  function integrationsView() {
    const chips = model.integrations.map((it) => '<span class="chip">' + esc(it) + '</span>').join("");
    return '<section class="panel"><h2>Integrations</h2><div class="chips">' + chips + '</div></section>';
  }

  function opsView() {
    return '<section class="panel"><h2>Ops</h2><div class="item"><strong>Job</strong><span>' + esc(model.job_id) + '</span></div><div class="item"><strong>Plan</strong><span>' + esc(model.plan) + '</span></div><div class="item"><strong>Deployment</strong><span>' + esc(model.deployment) + '</span></div></section>';
  }

  function viewHTML() {
    switch (state.view) {
      case "entities":
        return entitiesView();
      case "workflows":
        return workflowsView();
      case "integrations":
        return integrationsView();
      case "ops":
        return opsView();
      default:
        return dashboardView();
    }
  }

  function render() {
    root.innerHTML = '<div class="shell">'
      + '<aside class="sidebar">'
      + '<h1>' + esc(model.app_name) + '</h1>'
      + '<p>' + esc(model.domain) + ' / ' + esc(model.region) + '</p>'
      + navButton('dashboard', 'Dashboard')
      + navButton('entities', 'Entities')
      + navButton('workflows', 'Workflows')
      + navButton('integrations', 'Integrations')
      + navButton('ops', 'Ops')
      + '</aside>'
      + '<main class="main">'
      + viewHTML()
      + '</main>'
      + '</div>';

    root.querySelectorAll("[data-view]").forEach((btn) => {
      btn.addEventListener("click", () => {
        state.view = btn.getAttribute("data-view") || "dashboard";
        render();
      });
    });
  }

  render();
})();"#;

const MOBILE_RUNTIME_JS: &str = r#"(function () {
  const model = __MODEL_JSON__;
  const state = { view: "home" };
  const root = document.getElementById("app");
  if (!root) return;

  function esc(v) {
    return String(v)
      .replaceAll("&", "&amp;")
      .replaceAll("<", "&lt;")
      .replaceAll(">", "&gt;")
      .replaceAll('"', "&quot;")
      .replaceAll("'", "&#39;");
  }

  function nav(id, label) {
    return '<button class="tab ' + (state.view === id ? 'active' : '') + '" data-view="' + id + '">' + label + '</button>';
  }

  function home() {
    return '<section class="card"><div class="k">App</div><div class="v">' + esc(model.app_name) + '</div></section>'
      + '<section class="card"><div class="k">Plan</div><div class="v">' + esc(model.plan) + '</div></section>'
      + '<section class="card"><div class="k">Deployment</div><div class="v">' + esc(model.deployment) + '</div></section>';
  }

  function flows() {
    return '<section class="card"><div class="k">Flows</div><ul>' + model.workflows.map((wf) => '<li>' + esc(wf) + '</li>').join("") + '</ul></section>';
  }

  function data() {
    return '<section class="card"><div class="k">Data</div><ul>' + model.entities.map((e) => '<li>' + esc(e) + '</li>').join("") + '</ul></section>';
  }

  function ops() {
    return '<section class="card"><div class="k">Job</div><div class="v">' + esc(model.job_id) + '</div></section>'
      + '<section class="card"><div class="k">Integrations</div><div class="chips">' + model.integrations.map((it) => '<span class="chip">' + esc(it) + '</span>').join("") + '</div></section>';
  }

  function body() {
    switch (state.view) {
      case "flows":
        return flows();
      case "data":
        return data();
      case "ops":
        return ops();
      default:
        return home();
    }
  }

  function render() {
    root.innerHTML = '<div class="phone">'
      + '<header><h1>' + esc(model.app_name) + '</h1><p>' + esc(model.domain) + '</p></header>'
      + '<main>' + body() + '</main>'
      + '<nav>'
      + nav('home', 'Home')
      + nav('flows', 'Flows')
      + nav('data', 'Data')
      + nav('ops', 'Ops')
      + '</nav>'
      + '</div>';

    root.querySelectorAll("[data-view]").forEach((btn) => {
      btn.addEventListener("click", () => {
        state.view = btn.getAttribute("data-view") || "home";
        render();
      });
    });
  }

  render();
})();"#;

const WEB_CSS: &str = r#"
:root { --bg:#071123; --panel:#12213d; --ink:#eaf1ff; --muted:#9bb2dc; --accent:#21c7aa; }
* { box-sizing:border-box; }
body { margin:0; font-family:"Plus Jakarta Sans","Avenir Next","Segoe UI",sans-serif; background:linear-gradient(170deg,#071123,#0f1f39 70%,#1f3558); color:var(--ink); min-height:100vh; }
.shell { display:grid; grid-template-columns:240px 1fr; min-height:100vh; }
.sidebar { padding:16px; border-right:1px solid rgba(164,191,241,.24); background:rgba(9,18,35,.88); }
.sidebar h1 { margin:0 0 4px; font-size:18px; }
.sidebar p { margin:0 0 12px; color:var(--muted); font-size:12px; }
.tab { width:100%; text-align:left; padding:9px; margin:0 0 8px; border-radius:10px; border:1px solid rgba(164,191,241,.24); background:#102447; color:#e6efff; cursor:pointer; }
.tab.active { border-color:#2de0c1; background:linear-gradient(120deg,#0d4f61,#175081); }
.main { padding:16px; }
.panel { border:1px solid rgba(164,191,241,.24); border-radius:12px; background:rgba(18,33,61,.85); padding:12px; }
.panel h2 { margin:0 0 10px; }
.metrics { display:grid; grid-template-columns:repeat(4,minmax(0,1fr)); gap:8px; margin-bottom:12px; }
.metric { border:1px solid rgba(164,191,241,.24); background:#102447; border-radius:10px; padding:10px; }
.metric .k { font-size:11px; text-transform:uppercase; color:var(--muted); }
.metric .v { font-size:22px; margin-top:6px; font-weight:700; }
.hint { color:var(--muted); font-size:13px; }
table { width:100%; border-collapse:collapse; }
th, td { text-align:left; border-bottom:1px solid rgba(164,191,241,.2); padding:8px; font-size:13px; }
.list { display:grid; gap:8px; }
.item { display:flex; justify-content:space-between; gap:8px; padding:9px; border-radius:10px; border:1px solid rgba(164,191,241,.24); background:#102447; }
.chips { display:flex; flex-wrap:wrap; gap:8px; }
.chip { border:1px solid rgba(164,191,241,.34); border-radius:999px; background:#102447; padding:5px 9px; font-size:12px; }
@media (max-width: 920px) { .shell { grid-template-columns:1fr; } .metrics { grid-template-columns:repeat(2,minmax(0,1fr)); } }
"#;

const MOBILE_CSS: &str = r#"
:root { --bg:#0b1220; --panel:#1f2937; --ink:#f8fafc; --muted:#9fb1cb; }
* { box-sizing:border-box; }
body { margin:0; min-height:100vh; background:radial-gradient(circle at 18% 8%,#1b3355,#0a111d); font-family:"Plus Jakarta Sans","Avenir Next","Segoe UI",sans-serif; color:var(--ink); }
#app { min-height:100vh; display:flex; align-items:center; justify-content:center; padding:16px; }
.phone { width:100%; max-width:390px; height:760px; border-radius:28px; border:1px solid rgba(159,177,203,.35); background:linear-gradient(180deg,#0f172a,#111827); box-shadow:0 28px 60px rgba(2,6,23,.64); display:grid; grid-template-rows:auto 1fr auto; overflow:hidden; }
header { padding:14px; border-bottom:1px solid rgba(159,177,203,.2); background:rgba(15,23,42,.92); }
header h1 { margin:0; font-size:16px; }
header p { margin:3px 0 0; color:var(--muted); font-size:12px; }
main { padding:12px; overflow:auto; display:grid; gap:10px; }
.card { border:1px solid rgba(159,177,203,.27); border-radius:14px; padding:11px; background:rgba(31,41,55,.86); }
.k { color:var(--muted); font-size:11px; text-transform:uppercase; }
.v { margin-top:6px; font-weight:700; }
ul { margin:8px 0 0; padding-left:18px; }
li { margin:5px 0; }
nav { display:grid; grid-template-columns:repeat(4,minmax(0,1fr)); gap:4px; padding:8px; border-top:1px solid rgba(159,177,203,.2); background:rgba(15,23,42,.96); }
.tab { border:0; border-radius:10px; padding:8px 5px; font-size:11px; background:#1f2937; color:#d6e2f4; cursor:pointer; }
.tab.active { background:linear-gradient(120deg,#0e7490,#0f766e); color:#ecfeff; }
.chips { display:flex; gap:8px; flex-wrap:wrap; }
.chip { border:1px solid rgba(159,177,203,.35); border-radius:999px; padding:5px 8px; font-size:11px; }
"#;

#[cfg(test)]
mod tests {
    use super::{render_runtime_asset, runtime_client, runtime_content_type};
    use vda_model::{FileArtifact, Job};

    #[test]
    fn runtime_client_defaults_to_web() {
        assert_eq!(runtime_client("Mobile"), "mobile");
        assert_eq!(runtime_client("desktop"), "web");
        assert_eq!(runtime_client(""), "web");
    }

    #[test]
    fn generated_asset_wins_over_stock_template() {
        let mut job = Job::default();
        job.files.push(FileArtifact {
            path: "apps/demo/clients/web/app.js".to_string(),
            language: "javascript".to_string(),
            content: "custom();".to_string(),
        });
        let (content_type, bytes) =
            render_runtime_asset(&job, "web", "app.js").expect("asset");
        assert_eq!(content_type, "application/javascript; charset=utf-8");
        assert_eq!(bytes, b"custom();".to_vec());
    }

    #[test]
    fn unknown_asset_is_absent() {
        let job = Job::default();
        assert!(render_runtime_asset(&job, "web", "favicon.ico").is_none());
        assert_eq!(runtime_content_type("x.css"), "text/css; charset=utf-8");
    }
}
