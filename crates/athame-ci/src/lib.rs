//! Athame CI - pipelines composed from tool modules
//!
//! Each pipeline runs its phases strictly in order
//! (verify, build, scan, publish, deploy). Verification fans out across
//! independent checks and joins before moving on. Notifications are sent
//! around phase transitions and never change a pipeline's outcome.

pub mod demos;
pub mod deploy;
pub mod error;
pub mod fanout;
pub mod go;
pub mod miele;
pub mod mkdocs;
pub mod notify;
pub mod obs;
pub mod phase;
pub mod repo;
pub mod site_image;
pub mod telemetry;

pub use deploy::{
    deploy_all, CloudRunTarget, DeployOutcome, DeployStrategy, DeployTarget, FlyioTarget,
    RenderTarget,
};
pub use error::{CheckError, DeployError, NotifyError, PipelineError, PipelineResult};
pub use fanout::{join_all_first_error, run_checks, CheckTask, FanOutPolicy, FanOutReport, TaskOutcome};
pub use go::{GoCi, GoCiConfig};
pub use miele::{MieleCi, MieleCiConfig};
pub use mkdocs::{MkdocsCi, MkdocsCiConfig};
pub use notify::{
    notify_best_effort, AppriseNotifier, DisabledNotifier, Notification, Notifier, NtfyNotifier,
};
pub use phase::{Phase, PhaseRecord, PipelineReport, PipelineRun};
pub use site_image::SiteImage;
pub use telemetry::init_tracing;
