//! Container descriptions.
//!
//! A [`ContainerSpec`] is a value: every `with_*` method returns a new spec
//! with one more operation appended, so a tool's `base()` can be extended by
//! any number of callers without interference. Nothing runs until the spec is
//! handed to a [`ContainerEngine`](crate::ContainerEngine).

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::artifact::{HostDirectory, HostFile};
use crate::secret::Secret;

/// Target platform of a container (`os/arch`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Platform(pub String);

impl Platform {
    pub fn linux_amd64() -> Self {
        Self("linux/amd64".to_string())
    }

    pub fn linux_arm64() -> Self {
        Self("linux/arm64".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Tag-safe form (`linux/arm64` -> `linux-arm64`).
    pub fn slug(&self) -> String {
        self.0.replace('/', "-")
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One step in building up a container.
#[derive(Debug, Clone)]
pub enum Op {
    /// Run a command; later operations see its filesystem changes.
    Exec(Vec<String>),
    Workdir(String),
    /// Set an environment variable. With `expand`, `$VAR` references are
    /// resolved inside the container at exec time.
    Env {
        name: String,
        value: String,
        expand: bool,
    },
    SecretEnv {
        name: String,
        secret: Secret,
    },
    User(String),
    MountDirectory {
        path: String,
        source: HostDirectory,
    },
    MountFile {
        path: String,
        source: HostFile,
    },
    MountSecret {
        path: String,
        secret: Secret,
    },
    /// Persistent named volume shared across runs.
    MountCache {
        path: String,
        volume: String,
    },
    CopyDirectory {
        path: String,
        source: HostDirectory,
    },
    CopyFile {
        path: String,
        source: HostFile,
    },
    NewFile {
        path: String,
        contents: String,
    },
    ExposePort(u16),
    Label {
        name: String,
        value: String,
    },
    Entrypoint(Vec<String>),
    ServiceBinding {
        alias: String,
        service: Box<ServiceSpec>,
    },
}

/// A container to be built up and run.
#[derive(Debug, Clone)]
pub struct ContainerSpec {
    image: String,
    platform: Option<Platform>,
    ops: Vec<Op>,
}

impl ContainerSpec {
    /// Start from an image reference.
    pub fn from_image(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            platform: None,
            ops: Vec::new(),
        }
    }

    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = Some(platform);
        self
    }

    fn push(mut self, op: Op) -> Self {
        self.ops.push(op);
        self
    }

    pub fn with_exec<I, S>(self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.push(Op::Exec(args.into_iter().map(Into::into).collect()))
    }

    pub fn with_workdir(self, path: impl Into<String>) -> Self {
        self.push(Op::Workdir(path.into()))
    }

    pub fn with_env_variable(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.push(Op::Env {
            name: name.into(),
            value: value.into(),
            expand: false,
        })
    }

    /// Like [`with_env_variable`](Self::with_env_variable) but `$VAR`
    /// references in `value` are expanded inside the container.
    pub fn with_expanded_env_variable(
        self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.push(Op::Env {
            name: name.into(),
            value: value.into(),
            expand: true,
        })
    }

    pub fn with_secret_variable(self, name: impl Into<String>, secret: &Secret) -> Self {
        self.push(Op::SecretEnv {
            name: name.into(),
            secret: secret.clone(),
        })
    }

    pub fn with_user(self, user: impl Into<String>) -> Self {
        self.push(Op::User(user.into()))
    }

    pub fn with_mounted_directory(self, path: impl Into<String>, source: &HostDirectory) -> Self {
        self.push(Op::MountDirectory {
            path: path.into(),
            source: source.clone(),
        })
    }

    pub fn with_mounted_file(self, path: impl Into<String>, source: &HostFile) -> Self {
        self.push(Op::MountFile {
            path: path.into(),
            source: source.clone(),
        })
    }

    pub fn with_mounted_secret(self, path: impl Into<String>, secret: &Secret) -> Self {
        self.push(Op::MountSecret {
            path: path.into(),
            secret: secret.clone(),
        })
    }

    pub fn with_mounted_cache(self, path: impl Into<String>, volume: impl Into<String>) -> Self {
        self.push(Op::MountCache {
            path: path.into(),
            volume: volume.into(),
        })
    }

    /// Copy a directory into the container (unlike a mount, the copy becomes
    /// part of the container filesystem and of any published image).
    pub fn with_directory(self, path: impl Into<String>, source: &HostDirectory) -> Self {
        self.push(Op::CopyDirectory {
            path: path.into(),
            source: source.clone(),
        })
    }

    pub fn with_file(self, path: impl Into<String>, source: &HostFile) -> Self {
        self.push(Op::CopyFile {
            path: path.into(),
            source: source.clone(),
        })
    }

    pub fn with_new_file(self, path: impl Into<String>, contents: impl Into<String>) -> Self {
        self.push(Op::NewFile {
            path: path.into(),
            contents: contents.into(),
        })
    }

    pub fn with_exposed_port(self, port: u16) -> Self {
        self.push(Op::ExposePort(port))
    }

    pub fn with_label(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.push(Op::Label {
            name: name.into(),
            value: value.into(),
        })
    }

    pub fn with_entrypoint<I, S>(self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.push(Op::Entrypoint(args.into_iter().map(Into::into).collect()))
    }

    /// Clear the image entrypoint so published images and execs start clean.
    pub fn without_entrypoint(self) -> Self {
        self.push(Op::Entrypoint(Vec::new()))
    }

    pub fn with_service_binding(self, alias: impl Into<String>, service: ServiceSpec) -> Self {
        self.push(Op::ServiceBinding {
            alias: alias.into(),
            service: Box::new(service),
        })
    }

    /// Run this container in the background as a service.
    pub fn as_service<I, S>(self, args: I) -> ServiceSpec
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ServiceSpec {
            container: self,
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    pub fn image(&self) -> &str {
        &self.image
    }

    pub fn platform(&self) -> Option<&Platform> {
        self.platform.as_ref()
    }

    pub fn ops(&self) -> &[Op] {
        &self.ops
    }

    /// All exec argument vectors, in order.
    pub fn execs(&self) -> Vec<&[String]> {
        self.ops
            .iter()
            .filter_map(|op| match op {
                Op::Exec(args) => Some(args.as_slice()),
                _ => None,
            })
            .collect()
    }

    /// The last exec, if any.
    pub fn last_exec(&self) -> Option<&[String]> {
        self.execs().pop()
    }

    /// Effective working directory after all operations.
    pub fn workdir(&self) -> Option<&str> {
        self.ops.iter().rev().find_map(|op| match op {
            Op::Workdir(w) => Some(w.as_str()),
            _ => None,
        })
    }

    /// Labels in declaration order.
    pub fn labels(&self) -> Vec<(&str, &str)> {
        self.ops
            .iter()
            .filter_map(|op| match op {
                Op::Label { name, value } => Some((name.as_str(), value.as_str())),
                _ => None,
            })
            .collect()
    }

    /// Contents of a file written with [`with_new_file`](Self::with_new_file).
    pub fn new_file(&self, path: &str) -> Option<&str> {
        self.ops.iter().rev().find_map(|op| match op {
            Op::NewFile { path: p, contents } if p == path => Some(contents.as_str()),
            _ => None,
        })
    }

    /// Services this container is bound to.
    pub fn services(&self) -> Vec<(&str, &ServiceSpec)> {
        self.ops
            .iter()
            .filter_map(|op| match op {
                Op::ServiceBinding { alias, service } => Some((alias.as_str(), service.as_ref())),
                _ => None,
            })
            .collect()
    }

    /// Names of secrets referenced anywhere in the spec.
    pub fn secret_names(&self) -> Vec<&str> {
        self.ops
            .iter()
            .filter_map(|op| match op {
                Op::SecretEnv { secret, .. } | Op::MountSecret { secret, .. } => {
                    Some(secret.name())
                }
                _ => None,
            })
            .collect()
    }
}

/// A background container reachable by alias.
#[derive(Debug, Clone)]
pub struct ServiceSpec {
    pub container: ContainerSpec,
    pub args: Vec<String>,
}

impl ServiceSpec {
    /// Ports the service exposes.
    pub fn exposed_ports(&self) -> Vec<u16> {
        self.container
            .ops()
            .iter()
            .filter_map(|op| match op {
                Op::ExposePort(p) => Some(*p),
                _ => None,
            })
            .collect()
    }
}
