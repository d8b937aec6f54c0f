use super::handlers::{health, refresh, tokens};
use crate::credentials::types::{
    ErrorResponse, OkResponse, RefreshedAccess, SetTokensRequest, TokenResponse,
};
use utoipa::{
    openapi::{Contact, License},
    OpenApi,
};

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        tokens::set_tokens,
        tokens::clear_tokens,
        refresh::refresh,
    ),
    components(schemas(
        health::Health,
        SetTokensRequest,
        RefreshedAccess,
        TokenResponse,
        OkResponse,
        ErrorResponse,
    )),
    tags(
        (name = "broker", description = "Credential cookie broker routes"),
        (name = "health", description = "Liveness and build information"),
    )
)]
struct ApiDoc;

/// `OpenAPI` document for the gateway, with Cargo metadata as the info block.
#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    let mut doc = ApiDoc::openapi();
    doc.info.title = env!("CARGO_PKG_NAME").to_string();
    doc.info.version = env!("CARGO_PKG_VERSION").to_string();
    doc.info.description = optional_str(env!("CARGO_PKG_DESCRIPTION")).map(str::to_string);
    doc.info.contact = cargo_contact();
    doc.info.license = optional_str(env!("CARGO_PKG_LICENSE")).map(|identifier| {
        let mut license = License::new(identifier);
        license.identifier = Some(identifier.to_string());
        license
    });
    doc
}

fn cargo_contact() -> Option<Contact> {
    // Cargo authors are `;` separated and may include "Name <email>".
    let primary = env!("CARGO_PKG_AUTHORS").split(';').next().map(str::trim)?;
    if primary.is_empty() {
        return None;
    }

    let (name, email) = parse_author(primary);
    if name.is_none() && email.is_none() {
        return None;
    }

    let mut contact = Contact::new();
    contact.name = name.map(str::to_string);
    contact.email = email.map(str::to_string);
    Some(contact)
}

fn parse_author(author: &str) -> (Option<&str>, Option<&str>) {
    match author.split_once('<') {
        Some((name, rest)) => {
            let email = rest.trim_end_matches('>').trim();
            (optional_str(name.trim()), optional_str(email))
        }
        None => (optional_str(author), None),
    }
}

fn optional_str(value: &str) -> Option<&str> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value)
    }
}
