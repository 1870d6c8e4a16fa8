pub mod action_menu;
pub mod basicmessage;
pub mod connections;
pub mod credentials;
pub mod presentations;
pub mod problem_report;
pub mod routing;
pub mod trustping;

pub use action_menu::{Menu, MenuForm, MenuFormParam, MenuOption, MenuRequest, Perform};
pub use basicmessage::BasicMessage;
pub use connections::{
    ConnectionDetail, ConnectionInvitation, ConnectionRequest, ConnectionResponse, DidDoc,
};
pub use credentials::{CredentialIssue, CredentialOffer, CredentialRequest};
pub use presentations::{CredentialPresentation, PresentationRequest};
pub use problem_report::ProblemReport;
pub use routing::{
    Forward, Paginate, Paginated, RouteAction, RouteQueryRequest, RouteQueryResponse,
    RouteQueryResult, RouteUpdate, RouteUpdateRequest, RouteUpdateResponse, RouteUpdateResult,
    RouteUpdated,
};
pub use trustping::{Ping, PingResponse};
