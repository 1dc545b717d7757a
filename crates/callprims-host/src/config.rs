/// Execution role of a host process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Role {
    /// Authoritative instance: registers and executes handlers and publishers.
    Server,
    /// Consumer instance: only invokes and subscribes.
    #[default]
    Client,
}

impl Role {
    pub fn is_server(self) -> bool {
        matches!(self, Role::Server)
    }
}

/// Controls in-process host behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostConfig {
    /// Role this host plays.
    pub role: Role,
    /// When true, subscribing twice with the same name and input returns
    /// the live subscription instead of starting another one.
    pub dedupe_subscriptions: bool,
}

impl HostConfig {
    pub fn server() -> Self {
        Self {
            role: Role::Server,
            ..Self::default()
        }
    }

    pub fn client() -> Self {
        Self::default()
    }
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            role: Role::Client,
            dedupe_subscriptions: true,
        }
    }
}
