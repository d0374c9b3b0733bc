//! Folio - content publishing and SEO backend
//!
//! Blog posts and hierarchical pages with SEO metadata, a rule-based SEO
//! analyzer and site auditor, sitemap and robots generation, redirects and
//! basic content analytics, served over a JSON HTTP API.

pub mod api;
pub mod cache;
pub mod config;
pub mod db;
pub mod models;
pub mod services;
