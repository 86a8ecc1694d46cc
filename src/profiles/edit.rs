use axum::{debug_handler, response::IntoResponse, Form};
use serde::Deserialize;
use tracing::{info, warn};

use crate::{
    error::{ChatError, ValidationError},
    model::UserRecord,
    nav::Route,
    notice::Intent,
    session::{Context, Ctx},
    store::{DocRef, FieldUpdate, StoreError, USERS},
    AppResult,
};

pub const MAX_NAME_LEN: usize = 25;

pub fn validate_name(pending: &str, stored: &str) -> Result<(), ValidationError> {
    if pending.is_empty() {
        return Err(ValidationError::Empty);
    }
    if pending == stored {
        return Err(ValidationError::Unchanged);
    }
    let len = pending.chars().count();
    if len > MAX_NAME_LEN {
        return Err(ValidationError::TooLong { len, max: MAX_NAME_LEN });
    }
    Ok(())
}

/// Renames the signed-in user, returning the new name.
///
/// The pending name is checked against the stored record, then written to
/// the identity provider and to the record, in that order. If the record
/// write fails the identity name is put back. Concurrent edits are
/// last-writer-wins.
pub async fn submit_name(ctx: &mut Context, pending: &str) -> Result<String, ChatError> {
    let identity = ctx.session.identity().cloned().ok_or(ChatError::SignedOut)?;
    let doc = DocRef::new(USERS, identity.uid.as_str());

    let stored: UserRecord = ctx
        .store
        .get(&doc)
        .await
        .map_err(ChatError::Read)?
        .ok_or_else(|| ChatError::Read(StoreError::NotFound(doc.clone())))?
        .decode()
        .map_err(ChatError::Read)?;
    if let Err(err) = validate_name(pending, &stored.name) {
        // the field falls back to what is stored now, not to an older copy
        ctx.session.set_user(stored);
        return Err(err.into());
    }

    let renamed = ctx.identity.update_display_name(&identity, pending).await?;
    info!(uid = %identity.uid, name = pending, "identity renamed");

    if let Err(source) = ctx
        .store
        .update(&doc, vec![FieldUpdate::set("name", pending)])
        .await
    {
        warn!(uid = %identity.uid, error = %source, "record rename failed, restoring identity name");
        let previous = identity.display_name.as_deref().unwrap_or(&stored.name);
        if let Err(err) = ctx.identity.update_display_name(&renamed, previous).await {
            warn!(uid = %identity.uid, error = %err, "could not restore identity name");
        }
        return Err(ChatError::Write(source));
    }

    ctx.session.set_identity_user(renamed);
    ctx.session.set_user(UserRecord {
        name: pending.to_owned(),
        ..stored
    });
    Ok(pending.to_owned())
}

#[derive(Debug, Deserialize)]
pub(crate) struct NameForm {
    name: String,
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn submit(
    mut ctx: Ctx,
    Form(NameForm { name }): Form<NameForm>,
) -> AppResult<impl IntoResponse> {
    if let Err(err) = submit_name(&mut ctx, &name).await {
        ctx.notices.report(&err, Some(Intent::SubmitName(name)));
    }

    ctx.persist().await?;
    Ok(Route::Entry)
}
