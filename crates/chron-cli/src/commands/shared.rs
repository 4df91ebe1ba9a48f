use anyhow::Context;
use chron_core::value::FieldValue;

use crate::context::AppContext;

/// Parse a command-line identifier into the tracked type's key shape.
pub fn parse_key(ctx: &AppContext, entity_type: &str, id: &str) -> anyhow::Result<Vec<FieldValue>> {
    let tracked = ctx
        .service
        .config()
        .tracked(entity_type)
        .with_context(|| format!("'{entity_type}' is not an audited entity type"))?;
    Ok(tracked.parse_key(id)?)
}
