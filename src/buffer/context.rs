//! Device and application context seeded into every tracker buffer.

use std::fmt;
use std::sync::Arc;

use chrono::{Local, Utc};
use parking_lot::RwLock;

#[cfg(test)]
use mockall::automock;

use crate::domain::{Param, ParamOption, format_timestamp};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionType {
    Offline,
    Gprs,
    Edge,
    ThreeG,
    ThreeGPlus,
    FourG,
    Wifi,
    #[default]
    Unknown,
}

impl ConnectionType {
    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionType::Offline => "offline",
            ConnectionType::Gprs => "gprs",
            ConnectionType::Edge => "edge",
            ConnectionType::ThreeG => "3g",
            ConnectionType::ThreeGPlus => "3g+",
            ConnectionType::FourG => "4g",
            ConnectionType::Wifi => "wifi",
            ConnectionType::Unknown => "unknown",
        }
    }

    /// Unknown counts as online: the send attempt decides.
    pub fn is_online(self) -> bool {
        self != ConnectionType::Offline
    }
}

impl fmt::Display for ConnectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Source of device and application context.
///
/// Platform integrations implement this; `DefaultContext` derives what it can
/// from the host process.
#[cfg_attr(test, automock)]
pub trait ContextProvider: Send + Sync {
    fn sdk_version(&self) -> String {
        env!("CARGO_PKG_VERSION").to_string()
    }
    fn platform(&self) -> String;
    fn language(&self) -> String;
    fn device(&self) -> String;
    fn os(&self) -> String;
    fn application_id(&self) -> String;
    fn application_version(&self) -> String;
    fn local_hour(&self) -> String {
        Local::now().format("%Hx%Mx%S").to_string()
    }
    fn screen_resolution(&self) -> String;
    fn carrier(&self) -> String;
    fn connection_type(&self) -> ConnectionType;
    fn download_source(&self) -> String;
}

/// Context derived from the running process.
#[derive(Debug)]
pub struct DefaultContext {
    application_id: String,
    application_version: String,
    device: String,
    language: String,
    connection: RwLock<ConnectionType>,
}

impl DefaultContext {
    pub fn new(application_id: impl Into<String>, application_version: impl Into<String>) -> Self {
        let device = hostname::get()
            .ok()
            .and_then(|name| name.into_string().ok())
            .unwrap_or_else(|| "unknown".to_string());

        Self {
            application_id: application_id.into(),
            application_version: application_version.into(),
            device,
            language: language_from_env(),
            connection: RwLock::new(ConnectionType::Unknown),
        }
    }

    /// Connectivity reported by the host; there is no portable probe.
    pub fn set_connection_type(&self, connection: ConnectionType) {
        *self.connection.write() = connection;
    }
}

impl Default for DefaultContext {
    fn default() -> Self {
        Self::new(env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))
    }
}

impl ContextProvider for DefaultContext {
    fn platform(&self) -> String {
        "Rust".to_string()
    }

    fn language(&self) -> String {
        self.language.clone()
    }

    fn device(&self) -> String {
        format!("[{}]", self.device)
    }

    fn os(&self) -> String {
        format!("[{}]-[{}]", std::env::consts::OS, std::env::consts::ARCH)
    }

    fn application_id(&self) -> String {
        self.application_id.clone()
    }

    fn application_version(&self) -> String {
        format!("[{}]", self.application_version)
    }

    fn screen_resolution(&self) -> String {
        "0x0".to_string()
    }

    fn carrier(&self) -> String {
        String::new()
    }

    fn connection_type(&self) -> ConnectionType {
        *self.connection.read()
    }

    fn download_source(&self) -> String {
        "ext".to_string()
    }
}

/// `en_US.UTF-8` becomes `en-us`; anything unusable falls back to `en-us`.
fn language_from_env() -> String {
    std::env::var("LC_ALL")
        .or_else(|_| std::env::var("LANG"))
        .ok()
        .and_then(|raw| {
            let tag = raw.split('.').next().unwrap_or_default().replace('_', "-");
            (!tag.is_empty() && tag != "C" && tag != "POSIX").then(|| tag.to_lowercase())
        })
        .unwrap_or_else(|| "en-us".to_string())
}

fn from_context(
    context: &Arc<dyn ContextProvider>,
    key: &str,
    read: fn(&dyn ContextProvider) -> String,
    options: ParamOption,
) -> Param {
    let context = context.clone();
    Param::deferred(key, move || read(context.as_ref()), options)
}

/// The persistent parameters every buffer starts with.
///
/// All are deferred so the values reflect the moment a hit is built.
pub fn context_variables<F>(context: Arc<dyn ContextProvider>, user_id: F) -> Vec<Param>
where
    F: Fn() -> String + Send + Sync + 'static,
{
    let persistent = ParamOption::default().persistent();
    let encoded = persistent.encode();

    vec![
        from_context(&context, "vtag", |c| c.sdk_version(), persistent),
        from_context(&context, "ptag", |c| c.platform(), persistent),
        from_context(&context, "lng", |c| c.language(), persistent),
        from_context(&context, "mfmd", |c| c.device(), persistent),
        from_context(&context, "os", |c| c.os(), persistent),
        from_context(&context, "apid", |c| c.application_id(), persistent),
        from_context(&context, "apvr", |c| c.application_version(), encoded),
        from_context(&context, "hl", |c| c.local_hour(), persistent),
        from_context(&context, "r", |c| c.screen_resolution(), persistent),
        from_context(&context, "car", |c| c.carrier(), encoded),
        from_context(&context, "cn", |c| c.connection_type().to_string(), encoded),
        Param::deferred("ts", || format_timestamp(Utc::now()), persistent),
        from_context(&context, "dls", |c| c.download_source(), persistent),
        Param::deferred("idclient", user_id, persistent),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::{Buffer, BufferWriter};

    #[test]
    fn test_context_seeds_fourteen_persistent_params() {
        let context: Arc<dyn ContextProvider> = Arc::new(DefaultContext::new("com.example", "1.2"));
        let mut buffer = Buffer::seeded(context_variables(context, || "visitor".to_string()));

        assert_eq!(buffer.persistent().len(), 14);
        assert!(buffer.volatile().is_empty());

        BufferWriter::new(&mut buffer).set_with("custom", "x", ParamOption::default().persistent());
        assert_eq!(buffer.persistent().len(), 15);

        let idclient = buffer.entries("idclient");
        assert_eq!(idclient[0].value.evaluate(), "visitor");
        assert_eq!(buffer.entries("apvr")[0].value.evaluate(), "[1.2]");
        assert!(buffer.entries("apvr")[0].options.encode);
    }

    #[test]
    fn test_connection_is_read_at_build_time() {
        let context = Arc::new(DefaultContext::default());
        let params = context_variables(context.clone(), String::new);
        let cn = params.iter().find(|p| p.key == "cn").unwrap();

        assert_eq!(cn.value.evaluate(), "unknown");
        context.set_connection_type(ConnectionType::Wifi);
        assert_eq!(cn.value.evaluate(), "wifi");
        assert!(ConnectionType::Wifi.is_online());
        assert!(!ConnectionType::Offline.is_online());
    }

    #[test]
    fn test_mocked_context_feeds_params() {
        let mut mock = MockContextProvider::new();
        mock.expect_carrier().returning(|| "Orange FR".to_string());
        let context: Arc<dyn ContextProvider> = Arc::new(mock);

        let params = context_variables(context, String::new);
        let car = params.iter().find(|p| p.key == "car").unwrap();
        assert_eq!(car.value.evaluate(), "Orange FR");
    }
}
