// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};

/// Authenticated caller identity. Immutable for the lifetime of one
/// request; every downstream write must carry `tenant_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub tenant_id: String,
    pub subject: String,
}

impl Claims {
    #[must_use]
    pub fn new(tenant_id: impl Into<String>, subject: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            subject: subject.into(),
        }
    }
}
