use async_trait::async_trait;

use courier_messaging::MessageBody;

use crate::error::ProtocolError;
use crate::handlers::{unexpected, Handler};
use crate::request_context::RequestContext;
use crate::responder::Responder;

pub struct ProblemReportHandler;

#[async_trait]
impl Handler for ProblemReportHandler {
    async fn handle(
        &self,
        context: &RequestContext,
        _responder: &dyn Responder,
    ) -> Result<(), ProtocolError> {
        let MessageBody::ProblemReport(report) = context.message.body() else {
            return Err(unexpected(context));
        };
        tracing::warn!(
            thread_id = %context.message.thread_id(),
            connection_id = ?context.connection.as_ref().map(|c| &c.connection_id),
            explain = ?report.explain_ltxt,
            "problem report received"
        );
        Ok(())
    }
}
