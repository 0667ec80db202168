//! Apprise multi-service notifier.

use athame_engine::{ContainerSpec, Secret};

use crate::ToolImage;

pinned_tool!(
    Apprise,
    "caronc/apprise",
    "1.2.2@sha256:0d74af8c1df9cf1de91f20f46d00ddee3a3efa15be179f9dbbe8a0f99d64268f"
);

/// Quote for a POSIX shell single-quoted string.
fn sh_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

impl Apprise {
    /// Send `title`/`body` to the service URL held in `service`.
    ///
    /// The URL stays in the environment and is only expanded by the shell.
    pub fn send(&self, title: &str, body: &str, service: &Secret) -> ContainerSpec {
        self.base()
            .with_secret_variable("APPRISE_SERVICE_URL", service)
            .with_exec([
                "sh".to_string(),
                "-c".to_string(),
                format!(
                    "apprise -t {} -b {} \"$APPRISE_SERVICE_URL\"",
                    sh_quote(title),
                    sh_quote(body)
                ),
            ])
    }
}

impl ToolImage for Apprise {
    fn name(&self) -> &'static str {
        "apprise"
    }

    fn base(&self) -> ContainerSpec {
        self.pinned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_url_never_reaches_argv() {
        let url = Secret::new("APPRISE_SERVICE_URL", "slack://token/channel");
        let spec = Apprise::default().send("Tests Failed", "it's broken", &url);
        let cmd = spec.last_exec().unwrap().join(" ");
        assert!(!cmd.contains("slack://"));
        assert!(cmd.contains(r"'it'\''s broken'"));
        assert_eq!(spec.secret_names(), vec!["APPRISE_SERVICE_URL"]);
    }
}
