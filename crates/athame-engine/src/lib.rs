//! Athame Engine - container descriptions and the engines that run them
//!
//! Tool modules describe containers as [`ContainerSpec`] values; a
//! [`ContainerEngine`] pulls, runs, exports and publishes them.
//! [`DockerEngine`] drives the docker CLI, [`fakes::ScriptedEngine`] answers
//! from rules for tests.

pub mod artifact;
pub mod container;
pub mod docker;
pub mod engine;
pub mod error;
pub mod fakes;
pub mod image;
pub mod secret;

pub use artifact::{HostDirectory, HostFile};
pub use container::{ContainerSpec, Op, Platform, ServiceSpec};
pub use docker::{DockerConfig, DockerEngine};
pub use engine::{ContainerEngine, RegistryAuth};
pub use error::{EngineError, EngineResult};
pub use image::{ImageRef, DEFAULT_REGISTRY};
pub use secret::Secret;
