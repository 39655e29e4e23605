//! Cloudflare load balancer controller for Kubernetes Services
//!
//! Watches Services of type `LoadBalancer` carrying the hostname annotation and
//! the cluster's Nodes, and keeps a Cloudflare load balancer per Service in
//! step with them.

#![deny(missing_docs)]

pub mod cli;
pub mod controller;
pub mod runner;
pub mod startup;
