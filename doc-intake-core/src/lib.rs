#![doc = "doc-intake-core: core logic library for doc-intake."]

//! This crate contains the data model, the stage contracts and the run pipeline for doc-intake.
//! Each run authenticates, lists a remote document library, downloads every file, submits it
//! for layout analysis and archives the original bytes in blob storage.
//!
//! # Usage
//! Build a [`pipeline::Pipeline`] from a [`config::JobConfig`] (see [`pipeline::Pipeline::from_config`])
//! or from any set of [`contract`] implementations, then call [`pipeline::Pipeline::run`] once
//! per timer firing.

pub mod analyze;
pub mod auth;
pub mod blob;
pub mod config;
pub mod contract;
pub mod error;
pub mod graph;
pub mod pipeline;
