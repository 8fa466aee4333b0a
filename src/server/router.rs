use std::sync::Arc;

use tracing::debug;

use crate::config::Config;
use crate::handler::{
    ContinueHandler, DummyHandler, EchoHandler, Handler, HandlerBase, HealthCheckHandler,
    RandBytesGenHandler, WaitReleaseHandler,
};
use crate::http::request::Request;
use crate::registry::WaitRegistry;

/// Which handler answers a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Echo,
    Continue,
    Health,
    WaitRelease,
    RandBytes,
    Dummy,
}

impl Route {
    /// Resolves the route from the path component of a request target.
    pub fn resolve(path: &str) -> Self {
        match path {
            "/" | "/echo" => Route::Echo,
            "/continue" => Route::Continue,
            "/status" => Route::Health,
            "/wait" | "/release" => Route::WaitRelease,
            p if p.as_bytes().get(1).is_some_and(u8::is_ascii_digit) => Route::RandBytes,
            _ => Route::Dummy,
        }
    }
}

/// Creates one handler per incoming request.
pub struct Router {
    base: HandlerBase,
    healthy: bool,
    registry: Arc<WaitRegistry>,
}

impl Router {
    pub fn new(cfg: &Config, registry: Arc<WaitRegistry>) -> Self {
        Self {
            base: HandlerBase::new(cfg.response_version.clone()),
            healthy: cfg.healthy,
            registry,
        }
    }

    pub fn handler_for(&self, request: &Request) -> Box<dyn Handler> {
        let route = Route::resolve(request.path_only());
        debug!(path = %request.path, ?route, "routing request");

        let base = self.base.clone();
        match route {
            Route::Echo => Box::new(EchoHandler::new(base)),
            Route::Continue => Box::new(ContinueHandler::echo(base)),
            Route::Health => Box::new(HealthCheckHandler::new(base, self.healthy)),
            Route::WaitRelease => {
                Box::new(WaitReleaseHandler::new(base, Arc::clone(&self.registry)))
            }
            Route::RandBytes => Box::new(RandBytesGenHandler::new(base)),
            Route::Dummy => Box::new(DummyHandler::new(base)),
        }
    }
}
