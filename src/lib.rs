//! # Cluster testkit library
//!
//! Building blocks for end-to-end suites that drive a Kubernetes cluster through its
//! declarative API: resource handles pairing a desired definition with the last
//! observed object, idempotent create/delete, and bounded convergence waiting.

pub mod env;
pub mod k8s;
pub mod resource;
pub mod wait;
