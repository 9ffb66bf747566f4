//! Configuration structures for the syslog receiver

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, anyhow, bail, ensure};
use serde_json::Value;

use super::constants::{
    DEFAULT_HOST_PORT, DEFAULT_MAX_FRAME_BYTES, DEFAULT_READ_TIMEOUT, DEFAULT_SDPARAM_SEPARATOR,
};
use super::policy::ErrorPolicy;
use crate::sources::tcp::{IpFamily, KeepAlive, ListenAddr};
use crate::types::AnyResult;

/// Flat parameter table, the shape hosts hand to connector factories.
pub type ParamMap = serde_json::Map<String, Value>;

/// Server certificate plus optional client CAs (mutual TLS).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsConf {
    pub cert: PathBuf,
    pub key: PathBuf,
    /// Non-empty enables client certificate verification.
    pub allowed_cacerts: Vec<PathBuf>,
}

/// Configuration for the syslog receiver
#[derive(Debug, Clone, PartialEq)]
pub struct SyslogSourceSpec {
    pub address: ListenAddr,
    /// `None` disables the per-read deadline.
    pub read_timeout: Option<Duration>,
    /// `None` disables keep-alive, zero keeps the OS probe timing.
    pub keep_alive_period: Option<Duration>,
    /// 0 = unlimited
    pub max_connections: usize,
    pub best_effort: bool,
    pub sdparam_separator: String,
    pub max_frame_bytes: usize,
    pub tls: Option<TlsConf>,
}

impl Default for SyslogSourceSpec {
    fn default() -> Self {
        Self {
            address: ListenAddr::Tcp {
                host_port: DEFAULT_HOST_PORT.to_string(),
                family: IpFamily::Any,
            },
            read_timeout: Some(DEFAULT_READ_TIMEOUT),
            keep_alive_period: None,
            max_connections: 0,
            best_effort: false,
            sdparam_separator: DEFAULT_SDPARAM_SEPARATOR.to_string(),
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
            tls: None,
        }
    }
}

impl SyslogSourceSpec {
    /// Parse configuration directly from params table (Factory path)
    pub fn from_params(params: &ParamMap) -> AnyResult<Self> {
        let mut spec = Self::default();

        if let Some(v) = params.get("address") {
            let raw = v
                .as_str()
                .ok_or_else(|| anyhow!("address must be a string (got {})", v))?;
            spec.address = ListenAddr::parse(raw)?;
        }
        if let Some(v) = params.get("read_timeout") {
            let timeout = parse_duration(v).context("invalid read_timeout")?;
            spec.read_timeout = (!timeout.is_zero()).then_some(timeout);
        }
        if let Some(v) = params.get("keep_alive_period") {
            spec.keep_alive_period = Some(parse_duration(v).context("invalid keep_alive_period")?);
        }
        if let Some(v) = params.get("max_connections") {
            let n = v
                .as_i64()
                .ok_or_else(|| anyhow!("max_connections must be an integer (got {})", v))?;
            ensure!(n >= 0, "max_connections must be >= 0 (got {})", n);
            spec.max_connections = n as usize;
        }
        if let Some(v) = params.get("best_effort") {
            spec.best_effort = v
                .as_bool()
                .ok_or_else(|| anyhow!("best_effort must be a boolean (got {})", v))?;
        }
        if let Some(v) = params.get("sdparam_separator") {
            spec.sdparam_separator = v
                .as_str()
                .ok_or_else(|| anyhow!("sdparam_separator must be a string (got {})", v))?
                .to_string();
        }
        if let Some(v) = params.get("max_frame_bytes") {
            let n = v
                .as_i64()
                .ok_or_else(|| anyhow!("max_frame_bytes must be an integer (got {})", v))?;
            ensure!(n > 0, "max_frame_bytes must be > 0 (got {})", n);
            spec.max_frame_bytes = n as usize;
        }
        spec.tls = parse_tls(params)?;
        Ok(spec)
    }

    /// Parse a TOML table, e.g. the body of a `[sources.syslog]` section.
    pub fn from_toml_str(text: &str) -> AnyResult<Self> {
        let table: toml::Table = toml::from_str(text).context("invalid syslog toml")?;
        match serde_json::to_value(table)? {
            Value::Object(params) => Self::from_params(&params),
            other => bail!("syslog config must be a table (got {})", other),
        }
    }

    pub fn policy(&self) -> ErrorPolicy {
        ErrorPolicy::from_best_effort(self.best_effort)
    }

    pub fn keep_alive(&self) -> KeepAlive {
        KeepAlive::from_period(self.keep_alive_period)
    }
}

fn parse_tls(params: &ParamMap) -> AnyResult<Option<TlsConf>> {
    let path_of = |key: &str| -> AnyResult<Option<PathBuf>> {
        match params.get(key) {
            None => Ok(None),
            Some(Value::String(s)) if s.is_empty() => Ok(None),
            Some(Value::String(s)) => Ok(Some(PathBuf::from(s))),
            Some(other) => bail!("{} must be a path string (got {})", key, other),
        }
    };
    let cert = path_of("tls_cert")?;
    let key = path_of("tls_key")?;
    let allowed_cacerts = match params.get("tls_allowed_cacerts") {
        None => Vec::new(),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| {
                item.as_str()
                    .map(PathBuf::from)
                    .ok_or_else(|| anyhow!("tls_allowed_cacerts entries must be strings"))
            })
            .collect::<AnyResult<Vec<_>>>()?,
        Some(other) => bail!("tls_allowed_cacerts must be an array (got {})", other),
    };
    match (cert, key) {
        (Some(cert), Some(key)) => Ok(Some(TlsConf {
            cert,
            key,
            allowed_cacerts,
        })),
        (None, None) => {
            ensure!(
                allowed_cacerts.is_empty(),
                "tls_allowed_cacerts requires tls_cert and tls_key"
            );
            Ok(None)
        }
        _ => bail!("tls_cert and tls_key must be set together"),
    }
}

/// Integer seconds, or a string with `ms`/`s`/`m`/`h` suffix (`"0"` allowed).
pub fn parse_duration(value: &Value) -> AnyResult<Duration> {
    match value {
        Value::Number(n) => {
            let secs = n
                .as_u64()
                .ok_or_else(|| anyhow!("duration must be a non-negative integer (got {})", n))?;
            Ok(Duration::from_secs(secs))
        }
        Value::String(s) => parse_duration_str(s),
        other => bail!("duration must be an integer or string (got {})", other),
    }
}

fn parse_duration_str(raw: &str) -> AnyResult<Duration> {
    let s = raw.trim();
    let split = s
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(s.len());
    let (num, unit) = s.split_at(split);
    ensure!(!num.is_empty(), "invalid duration '{}'", raw);
    let n: u64 = num
        .parse()
        .map_err(|_| anyhow!("invalid duration '{}'", raw))?;
    let d = match unit.trim() {
        "ms" => Duration::from_millis(n),
        "" | "s" => Duration::from_secs(n),
        "m" => Duration::from_secs(n * 60),
        "h" => Duration::from_secs(n * 3600),
        other => bail!("unknown duration unit '{}' in '{}'", other, raw),
    };
    Ok(d)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(v: Value) -> ParamMap {
        match v {
            Value::Object(m) => m,
            _ => unreachable!(),
        }
    }

    #[test]
    fn defaults() {
        let spec = SyslogSourceSpec::from_params(&ParamMap::new()).unwrap();
        assert_eq!(spec, SyslogSourceSpec::default());
        assert_eq!(spec.address.to_string(), "tcp://0.0.0.0:6514");
        assert_eq!(spec.read_timeout, Some(Duration::from_secs(5)));
        assert_eq!(spec.keep_alive(), KeepAlive::Disabled);
        assert_eq!(spec.max_connections, 0);
        assert_eq!(spec.policy(), ErrorPolicy::Strict);
        assert_eq!(spec.sdparam_separator, "_");
        assert_eq!(spec.max_frame_bytes, 8192);
        assert!(spec.tls.is_none());
    }

    #[test]
    fn from_params_full() {
        let spec = SyslogSourceSpec::from_params(&params(json!({
            "address": "unix:///tmp/recv.sock",
            "read_timeout": "250ms",
            "keep_alive_period": 0,
            "max_connections": 4,
            "best_effort": true,
            "sdparam_separator": ".",
            "max_frame_bytes": 65536,
            "tls_cert": "/etc/pki/server.pem",
            "tls_key": "/etc/pki/server.key",
            "tls_allowed_cacerts": ["/etc/pki/ca.pem"],
        })))
        .unwrap();
        assert!(spec.address.is_unix());
        assert_eq!(spec.read_timeout, Some(Duration::from_millis(250)));
        assert_eq!(spec.keep_alive(), KeepAlive::OsDefault);
        assert_eq!(spec.max_connections, 4);
        assert_eq!(spec.policy(), ErrorPolicy::BestEffort);
        assert_eq!(spec.sdparam_separator, ".");
        assert_eq!(spec.max_frame_bytes, 65536);
        let tls = spec.tls.unwrap();
        assert_eq!(tls.cert, PathBuf::from("/etc/pki/server.pem"));
        assert_eq!(tls.allowed_cacerts, vec![PathBuf::from("/etc/pki/ca.pem")]);
    }

    #[test]
    fn zero_read_timeout_disables_it() {
        for v in [json!(0), json!("0s"), json!("0")] {
            let spec =
                SyslogSourceSpec::from_params(&params(json!({ "read_timeout": v }))).unwrap();
            assert!(spec.read_timeout.is_none());
        }
    }

    #[test]
    fn from_toml() {
        let spec = SyslogSourceSpec::from_toml_str(
            r#"
address = "tcp4://127.0.0.1:10514"
keep_alive_period = "1m"
read_timeout = 10
"#,
        )
        .unwrap();
        assert_eq!(spec.address.to_string(), "tcp4://127.0.0.1:10514");
        assert_eq!(spec.keep_alive(), KeepAlive::Period(Duration::from_secs(60)));
        assert_eq!(spec.read_timeout, Some(Duration::from_secs(10)));
    }

    #[test]
    fn reject_invalid_params() {
        let cases = [
            json!({ "address": 6514 }),
            json!({ "address": "udp://0.0.0.0:514" }),
            json!({ "read_timeout": -1 }),
            json!({ "read_timeout": "5 days" }),
            json!({ "max_connections": -2 }),
            json!({ "best_effort": "yes" }),
            json!({ "max_frame_bytes": 0 }),
            json!({ "tls_cert": "/a.pem" }),
            json!({ "tls_allowed_cacerts": ["/ca.pem"] }),
        ];
        for case in cases {
            assert!(
                SyslogSourceSpec::from_params(&params(case.clone())).is_err(),
                "{} should be rejected",
                case
            );
        }
    }

    #[test]
    fn duration_units() {
        assert_eq!(parse_duration_str("1500ms").unwrap(), Duration::from_millis(1500));
        assert_eq!(parse_duration_str("2h").unwrap(), Duration::from_secs(7200));
        assert_eq!(parse_duration_str(" 7 ").unwrap(), Duration::from_secs(7));
        assert!(parse_duration_str("ms").is_err());
        assert!(parse_duration_str("1.5s").is_err());
    }
}
