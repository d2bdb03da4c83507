//! Sluice Core
//!
//! Core types and abstractions for the Sluice transformation service.
//!
//! This crate contains:
//! - Domain types: pipeline configs, transformed data snapshots, job results
//!   and outbox events
//! - DTOs: request payloads together with their structural validation

pub mod domain;
pub mod dto;
