//! Server Configuration
//!
//! Read once at startup from the environment (after `.env` is loaded).

use std::path::PathBuf;
use std::time::Duration;

use swarm_core::{AgentError, Result};

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// `BIND_ADDR`
    pub bind_addr: String,

    /// `SWARM_DEFAULT_MODEL`, used when a request names no model
    pub default_model: String,

    /// `SWARM_TOOL_TIMEOUT_SECS`
    pub tool_timeout: Duration,

    /// `SWARM_MAX_ITERATIONS`
    pub max_iterations: usize,

    /// `SWARM_PARALLEL_TOOLS`
    pub parallel_tools: bool,

    /// `SWARM_FS_ROOT`; the filesystem tool is only registered when set
    pub fs_root: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.into(),
            default_model: DEFAULT_MODEL.into(),
            tool_timeout: Duration::from_secs(30),
            max_iterations: 10,
            parallel_tools: false,
            fs_root: None,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let defaults = Self::default();

        Ok(Self {
            bind_addr: get("BIND_ADDR").unwrap_or(defaults.bind_addr),
            default_model: get("SWARM_DEFAULT_MODEL").unwrap_or(defaults.default_model),
            tool_timeout: match get("SWARM_TOOL_TIMEOUT_SECS") {
                Some(raw) => Duration::from_secs(parse("SWARM_TOOL_TIMEOUT_SECS", &raw)?),
                None => defaults.tool_timeout,
            },
            max_iterations: match get("SWARM_MAX_ITERATIONS") {
                Some(raw) => parse("SWARM_MAX_ITERATIONS", &raw)?,
                None => defaults.max_iterations,
            },
            parallel_tools: match get("SWARM_PARALLEL_TOOLS") {
                Some(raw) => parse("SWARM_PARALLEL_TOOLS", &raw)?,
                None => defaults.parallel_tools,
            },
            fs_root: get("SWARM_FS_ROOT").map(PathBuf::from),
        })
    }
}

fn parse<T: std::str::FromStr>(variable: &str, raw: &str) -> Result<T> {
    raw.parse().map_err(|_| {
        AgentError::config(
            format!("env {variable}"),
            format!("cannot parse '{raw}'"),
            format!("set {variable} to a valid value or unset it"),
        )
    })
}
