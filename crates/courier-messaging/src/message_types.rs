//! Message family and type URIs.

/// Prefix shared by every message family this agent speaks.
pub const FAMILY_PREFIX: &str = "did:sov:BzCbsNYhMrjHiqZDTUASHg;spec/";

pub const CONNECTIONS_FAMILY: &str = "did:sov:BzCbsNYhMrjHiqZDTUASHg;spec/connections/1.0";
pub const CONNECTION_INVITATION: &str =
    "did:sov:BzCbsNYhMrjHiqZDTUASHg;spec/connections/1.0/invitation";
pub const CONNECTION_REQUEST: &str = "did:sov:BzCbsNYhMrjHiqZDTUASHg;spec/connections/1.0/request";
pub const CONNECTION_RESPONSE: &str =
    "did:sov:BzCbsNYhMrjHiqZDTUASHg;spec/connections/1.0/response";

pub const CREDENTIALS_FAMILY: &str = "did:sov:BzCbsNYhMrjHiqZDTUASHg;spec/credential-issuance/0.1";
pub const CREDENTIAL_OFFER: &str =
    "did:sov:BzCbsNYhMrjHiqZDTUASHg;spec/credential-issuance/0.1/credential-offer";
pub const CREDENTIAL_REQUEST: &str =
    "did:sov:BzCbsNYhMrjHiqZDTUASHg;spec/credential-issuance/0.1/credential-request";
pub const CREDENTIAL_ISSUE: &str =
    "did:sov:BzCbsNYhMrjHiqZDTUASHg;spec/credential-issuance/0.1/credential-issue";

pub const PRESENTATIONS_FAMILY: &str =
    "did:sov:BzCbsNYhMrjHiqZDTUASHg;spec/credential-presentation/0.1";
pub const PRESENTATION_REQUEST: &str =
    "did:sov:BzCbsNYhMrjHiqZDTUASHg;spec/credential-presentation/0.1/presentation-request";
pub const CREDENTIAL_PRESENTATION: &str =
    "did:sov:BzCbsNYhMrjHiqZDTUASHg;spec/credential-presentation/0.1/credential-presentation";

pub const ROUTING_FAMILY: &str = "did:sov:BzCbsNYhMrjHiqZDTUASHg;spec/routing/1.0";
pub const FORWARD: &str = "did:sov:BzCbsNYhMrjHiqZDTUASHg;spec/routing/1.0/forward";
pub const ROUTE_UPDATE_REQUEST: &str =
    "did:sov:BzCbsNYhMrjHiqZDTUASHg;spec/routing/1.0/route-update-request";
pub const ROUTE_UPDATE_RESPONSE: &str =
    "did:sov:BzCbsNYhMrjHiqZDTUASHg;spec/routing/1.0/route-update-response";
pub const ROUTE_QUERY_REQUEST: &str =
    "did:sov:BzCbsNYhMrjHiqZDTUASHg;spec/routing/1.0/route-query-request";
pub const ROUTE_QUERY_RESPONSE: &str =
    "did:sov:BzCbsNYhMrjHiqZDTUASHg;spec/routing/1.0/route-query-response";

pub const TRUST_PING_FAMILY: &str = "did:sov:BzCbsNYhMrjHiqZDTUASHg;spec/trust_ping/1.0";
pub const PING: &str = "did:sov:BzCbsNYhMrjHiqZDTUASHg;spec/trust_ping/1.0/ping";
pub const PING_RESPONSE: &str = "did:sov:BzCbsNYhMrjHiqZDTUASHg;spec/trust_ping/1.0/ping_response";

pub const BASIC_MESSAGE: &str = "did:sov:BzCbsNYhMrjHiqZDTUASHg;spec/basicmessage/1.0/message";

pub const PROBLEM_REPORT: &str =
    "did:sov:BzCbsNYhMrjHiqZDTUASHg;spec/notification/1.0/problem-report";

pub const ACTION_MENU_FAMILY: &str = "did:sov:BzCbsNYhMrjHiqZDTUASHg;spec/action-menu/1.0";
pub const MENU: &str = "did:sov:BzCbsNYhMrjHiqZDTUASHg;spec/action-menu/1.0/menu";
pub const MENU_REQUEST: &str = "did:sov:BzCbsNYhMrjHiqZDTUASHg;spec/action-menu/1.0/menu-request";
pub const PERFORM: &str = "did:sov:BzCbsNYhMrjHiqZDTUASHg;spec/action-menu/1.0/perform";

/// Signature decorator type for Ed25519 over SHA-512, single signer.
pub const SIGNATURE_ED25519_SHA512_SINGLE: &str =
    "did:sov:BzCbsNYhMrjHiqZDTUASHg;spec/signature/1.0/ed25519Sha512_single";
