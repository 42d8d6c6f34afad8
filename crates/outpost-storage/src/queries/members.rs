// SPDX-FileCopyrightText: 2026 Outpost Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Team member lookups used for follow-up assignee names.

use std::collections::HashMap;

use outpost_core::OutpostError;
use rusqlite::{params, params_from_iter};

use crate::database::{Database, map_tr_err};
use crate::models::{Member, placeholders};

/// Insert a member.
pub async fn create_member(db: &Database, member: &Member) -> Result<(), OutpostError> {
    let m = member.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO members (id, tenant_id, name) VALUES (?1, ?2, ?3)",
                params![m.id, m.tenant_id, m.name],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Names of the given members within a tenant, keyed by member ID.
pub async fn member_names(
    db: &Database,
    tenant_id: &str,
    ids: &[String],
) -> Result<HashMap<String, String>, OutpostError> {
    if ids.is_empty() {
        return Ok(HashMap::new());
    }
    let mut args = vec![tenant_id.to_string()];
    args.extend(ids.iter().cloned());
    let sql = format!(
        "SELECT id, name FROM members WHERE tenant_id = ?1 AND id IN ({})",
        placeholders(2, ids.len())
    );
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(args.iter()), |row| {
                Ok((row.get(0)?, row.get(1)?))
            })?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}
