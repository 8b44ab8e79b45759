// SPDX-License-Identifier: Apache-2.0

//! Parity documentation, behavioral fixtures, and web governance modules
//! generated alongside every job.

use crate::artifacts::{artifact, fallback, json_string, with_default, yaml_list};
use vda_model::{normalize_depth_label, Confirmation, FileArtifact};

pub(crate) fn parity_support_artifacts(slug: &str, conf: &Confirmation) -> Vec<FileArtifact> {
    let base = format!("apps/{slug}");
    let depth = normalize_depth_label(&conf.generation_depth);
    let entities = with_default(&conf.data_entities, "account");
    let workflows = with_default(&conf.core_workflows, "approve_request");
    let users = with_default(&conf.primary_users, "admin");

    let behavior_scenarios = format!(
        "depth_label: {depth}\ncategories:\n  unit:\n    - validate generated runtime handlers compile and route correctly\n  integration:\n    - execute /v1/entities/{{entity}}/records create/list flow\n    - execute /v1/actions/execute for declared workflows\n  e2e:\n    - validate cms/blog/forum/email primitive endpoints return seeded data\n    - validate identity register/login/invite/subdomain stubs\n  accessibility:\n    - verify generated web modules expose semantic labels in view models\ndeclared_entities:\n{}\ndeclared_workflows:\n{}\n",
        yaml_list(&entities),
        yaml_list(&workflows),
    );

    let parity_matrix = format!(
        "# Generated API Endpoint Matrix\n\nThis file inventories what the generated app runtime provides today versus the Violet Rails baseline.\n\n| Surface | Generated VDA Runtime | Violet Rails baseline | Current status |\n|---|---|---|---|\n| Entity CRUD | /v1/entities/{{entity}}/records (GET/POST) | Dynamic namespace/resource CRUD | Partial parity: generated runtime provides app-local CRUD lane |\n| Actions | /v1/actions/execute (POST) | api/:version/:namespace/:resource/:id/:action | Partial parity: deterministic action execution in app runtime |\n| Product primitives | /v1/primitives/cms/pages, /blog/posts, /forum/threads, /email/messages | Built-in CMS/blog/forum/mailbox | Partial parity: seeded primitives generated as runtime modules |\n| User lifecycle | /v1/identity/register, /login, /invitations, /roles, /subdomains/claim | Devise + invites + OTP + admin/subdomain governance | Partial parity: generated identity module + provider stubs |\n| Control plane mutations | POST /v1/apps/{{id}}/mutations (4 classes) | Dynamic control-plane resources/forms/actions | Intentionally constrained: rich operations live in generated runtime |\n\n## Declared Context\n\n- Domain: {}\n- Depth label: {depth}\n- Primary users: {}\n- Data entities: {}\n- Workflows: {}\n",
        fallback(&conf.domain, "saas"),
        users.join(", "),
        entities.join(", "),
        workflows.join(", "),
    );

    let boundary_notes = format!(
        "# Control Plane vs Generated Runtime Boundary\n\nThe deterministic control plane remains intentionally constrained for replay-safe operations.\n\n## Control plane responsibilities\n\n1. Tenant-scoped auth, idempotency, replay safety.\n2. Blueprint lifecycle and constrained mutation classes.\n3. Studio generation orchestration.\n\n## Generated runtime responsibilities\n\n1. Entity CRUD for declared data entities ({}).\n2. Action execution for declared workflows ({}).\n3. Product primitives (CMS/blog/forum/email) as generated modules.\n4. End-user identity flows (register/login/invite/roles/subdomain claim).\n\n## Why this split exists\n\nViolet Rails exposed a highly dynamic runtime inside one monolith. VDA intentionally keeps the control plane deterministic and relocates product-specific behavior into generated app runtime artifacts.\n",
        entities.join(", "),
        workflows.join(", "),
    );

    let migration_guide = "# Migration Guide: Content, Community, and Email\n\nThis generated app includes primitive starter surfaces for CMS, blog, forum, and email.\n\n## What is generated now\n\n1. CMS pages endpoint with seeded records.\n2. Blog posts endpoint with seeded records.\n3. Forum threads endpoint with seeded records.\n4. Email messages endpoint with seeded records.\n\n## Workaround path for production migration\n\n1. Keep generated endpoints as deterministic seams.\n2. Connect production-grade providers behind integration adapters.\n3. Preserve route contracts while replacing seeded handlers with domain logic.\n".to_string();

    let web_auth_module = format!(
        "export type GeneratedRole = string;\n\nexport const GENERATED_ROLES: GeneratedRole[] = {};\nexport const AUTH_PROVIDER_STUBS = [\"auth0\", \"clerk\", \"supabase\"] as const;\nexport const AUTH_BOUNDARY = \"control_plane_tokens_are_separate_from_generated_app_sessions\";\n",
        serde_json::to_string(&users).unwrap_or_else(|_| "[]".to_string()),
    );

    let rbac_model = format!(
        "{{\n  \"roles\": {},\n  \"constraints\": {},\n  \"auth_providers\": [\"auth0\", \"clerk\", \"supabase\"],\n  \"separation\": {}\n}}\n",
        serde_json::to_string(&users).unwrap_or_else(|_| "[]".to_string()),
        serde_json::to_string(&with_default(&conf.constraints, "all_mutations_idempotent"))
            .unwrap_or_else(|_| "[]".to_string()),
        json_string("control_plane_vs_generated_runtime"),
    );

    vec![
        artifact(
            &format!("{base}/tests/behavior/scenarios.yaml"),
            "yaml",
            behavior_scenarios,
        ),
        artifact(
            &format!("{base}/docs/parity/api-endpoint-matrix.md"),
            "markdown",
            parity_matrix,
        ),
        artifact(
            &format!("{base}/docs/parity/control-plane-vs-runtime.md"),
            "markdown",
            boundary_notes,
        ),
        artifact(
            &format!("{base}/docs/parity/migration-guide-content-community-email.md"),
            "markdown",
            migration_guide,
        ),
        artifact(
            &format!("{base}/clients/web/modules/cms.ts"),
            "typescript",
            WEB_CMS_MODULE.to_string(),
        ),
        artifact(
            &format!("{base}/clients/web/modules/blog.ts"),
            "typescript",
            WEB_BLOG_MODULE.to_string(),
        ),
        artifact(
            &format!("{base}/clients/web/modules/forum.ts"),
            "typescript",
            WEB_FORUM_MODULE.to_string(),
        ),
        artifact(
            &format!("{base}/clients/web/modules/email.ts"),
            "typescript",
            WEB_EMAIL_MODULE.to_string(),
        ),
        artifact(
            &format!("{base}/clients/web/modules/auth.ts"),
            "typescript",
            web_auth_module,
        ),
        artifact(
            &format!("{base}/config/rbac.generated.json"),
            "json",
            rbac_model,
        ),
    ]
}

const WEB_CMS_MODULE: &str = r#"export type CMSPage = {
  slug: string;
  title: string;
  body: string;
};

export const CMS_PAGES: CMSPage[] = [
  { slug: "home", title: "Home", body: "Generated CMS placeholder content." },
];
"#;

const WEB_BLOG_MODULE: &str = r#"export type BlogPost = {
  slug: string;
  title: string;
  excerpt: string;
};

export const BLOG_POSTS: BlogPost[] = [
  { slug: "hello-world", title: "Hello World", excerpt: "Generated blog starter post." },
];
"#;

const WEB_FORUM_MODULE: &str = r#"export type ForumThread = {
  id: string;
  title: string;
  author: string;
};

export const FORUM_THREADS: ForumThread[] = [
  { id: "thread-1", title: "Welcome", author: "system" },
];
"#;

const WEB_EMAIL_MODULE: &str = r#"export type EmailMessage = {
  id: string;
  subject: string;
  status: "queued" | "sent";
};

export const EMAIL_MESSAGES: EmailMessage[] = [
  { id: "email-1", subject: "Welcome to Violet", status: "queued" },
];
"#;
