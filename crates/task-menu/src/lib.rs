//! Stateless callback-token router for the tracker's inline menus.
//!
//! A chat front end forwards every button tap's token to
//! [`MenuRouter::route`] and renders the returned [`MenuResponse`];
//! nothing about the interaction is remembered between taps. The token
//! grammar lives in [`command`], the renderable response shape in
//! [`response`], and the chart seam in [`charts`].

pub mod charts;
pub mod command;
pub mod format;
pub mod response;
pub mod router;

pub use charts::{ChartArtifact, ChartError, ChartRenderer};
pub use command::{Callback, ChartKind, TaskAction};
pub use response::{Button, MenuResponse};
pub use router::{MenuConfig, MenuRouter, ReminderSink};
