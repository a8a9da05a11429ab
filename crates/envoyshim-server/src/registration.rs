use envoyshim_core::{Registrar, RegistrationReply, RegistrationRequest};
use envoyshim_wire::RequestHandler;

/// Registrar as seen from the channel, counting every outcome.
pub struct CountingRegistrar {
    inner: Registrar,
}

impl CountingRegistrar {
    pub fn new(inner: Registrar) -> Self {
        Self { inner }
    }
}

impl RequestHandler for CountingRegistrar {
    fn handle(&self, req: RegistrationRequest) -> RegistrationReply {
        let action = format!("{:?}", req.action).to_lowercase();
        let reply = self.inner.handle(&req);
        let status = if reply.is_success() { "ok" } else { "failed" };
        metrics::counter!(
            "envoyshim_registrations_total",
            "action" => action,
            "status" => status
        )
        .increment(1);
        reply
    }
}
