//! The `global` scope: daemon-wide settings, statistics and fleet state.

use futures_util::future::BoxFuture;
use protocol::{Method, STATUS_UNSUPPORTED, Version};
use serde_json::Value;
use std::sync::Arc;

use crate::config::Config;
use crate::container::{GameContainer, STATE_DISABLED};
use crate::response::Response;
use crate::scopes::{ScopeController, unmatched};

const KNOWN_METHODS: &[Method] = &[Method::Get, Method::Post];

pub struct GlobalController {
    container: Arc<GameContainer>,
    config: Arc<Config>,
}

impl GlobalController {
    pub fn new(container: Arc<GameContainer>, config: Arc<Config>) -> GlobalController {
        GlobalController { container, config }
    }

    /// Every non-hidden setting with its value.
    fn get_config(&self) -> Response {
        Response::ok().with("config", Value::Object(self.config.settings()))
    }

    fn statistics(&self) -> Response {
        let daemon_version = Version {
            major: parse_version(env!("CARGO_PKG_VERSION_MAJOR")),
            minor: parse_version(env!("CARGO_PKG_VERSION_MINOR")),
            patch: parse_version(env!("CARGO_PKG_VERSION_PATCH")),
        };
        let (major, minor, patch) = tale_engine::version();

        Response::ok()
            .with("players", self.container.num_players())
            .with("version", serde_json::to_value(daemon_version).unwrap_or(Value::Null))
            .with(
                "lib_version",
                serde_json::to_value(Version {
                    major,
                    minor,
                    patch,
                })
                .unwrap_or(Value::Null),
            )
    }

    /// Dumps the whole fleet. Per-game failures are logged, not reported.
    async fn dump(&self) -> Response {
        if !self.config.state.enabled {
            return Response::error(STATUS_UNSUPPORTED, STATE_DISABLED);
        }

        self.container.dump().await;
        Response::ok()
    }

    /// Restores the whole fleet, merging dumped games into the live set.
    async fn restore(&self) -> Response {
        self.container.restore().await.map(|_| Response::ok()).into()
    }
}

fn parse_version(raw: &str) -> u64 {
    raw.parse().unwrap_or(0)
}

impl ScopeController for GlobalController {
    fn name(&self) -> &str {
        "global"
    }

    fn resolve<'a>(
        &'a self,
        method: Method,
        action: &'a str,
        _args: &'a Value,
    ) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            match (method, action) {
                (Method::Get, "config") => self.get_config(),
                (Method::Get, "statistics") => self.statistics(),
                (Method::Post, "dump") => self.dump().await,
                (Method::Post, "restore") => self.restore().await,
                _ => unmatched(KNOWN_METHODS, method, action),
            }
        })
    }
}
