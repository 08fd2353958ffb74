//! `navi-fusion` – sensor fusion and track lifecycle.
//!
//! Pairs radar-like spatial returns with camera detections and keeps one
//! persistent identity per physical object while it is in view.
//!
//! # Modules
//!
//! - [`geometry`] – circular angle helpers and the
//!   [`BearingProjection`][geometry::BearingProjection] that turns a bounding
//!   box on a camera into a bearing on the tactical map.
//! - [`config`] – [`FusionConfig`][config::FusionConfig]: every matching and
//!   ageing threshold, runtime adjustable.
//! - [`registry`] – [`TrackRegistry`][registry::TrackRegistry]: owner of all
//!   live tracks with exactly-once reference indices.
//! - [`matcher`] – [`Matcher`][matcher::Matcher]: deterministic greedy
//!   pairing under camera, time and bearing constraints.
//! - [`lifecycle`] – [`LifecycleManager`][lifecycle::LifecycleManager]:
//!   creation, promotion, merge, demotion and expiry per cycle.
//! - [`engine`] – [`FusionEngine`][engine::FusionEngine]: thread-safe
//!   ingest buffer, cycle driver and immutable view publisher.
//! - [`source`] – producer traits drained by the engine.
//! - [`watchdog`] – [`SourceWatchdog`][watchdog::SourceWatchdog]: flags a
//!   detection source that has gone silent.
//! - [`proximity`] – [`ProximityMonitor`][proximity::ProximityMonitor]:
//!   edge-triggered close-range alerts.
//! - [`classify`] – obstacle categories and display projections.

pub mod classify;
pub mod config;
pub mod engine;
pub mod geometry;
pub mod lifecycle;
pub mod matcher;
pub mod proximity;
pub mod registry;
pub mod source;
pub mod watchdog;
