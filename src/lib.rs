//! Tutorly: role-gated web front-end for a tutor booking marketplace.

pub mod api;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod gate;
pub mod health;
pub mod matcher;
pub mod models;
pub mod optimistic;
pub mod role;
pub mod session;
pub mod web;
