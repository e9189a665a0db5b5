//! Request payload assembly.
//!
//! Everything here is pure: user options go in, a serializable request
//! body comes out. No I/O and no defaults beyond the ones documented on
//! [`cluster::ClusterOptions::new`].

pub mod cluster;
pub mod job;
pub mod machine;
pub mod properties;

pub use cluster::{build_cluster_spec, ClusterOptions, ClusterSpec};
pub use job::{build_job_spec, JarRef, JobOptions, JobSpec};
pub use properties::PropertyMap;

/// Split a comma-separated list, dropping blank entries.
pub fn split_list(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_list_preserves_order() {
        assert_eq!(split_list("b.txt, a.txt,,c.txt"), vec!["b.txt", "a.txt", "c.txt"]);
        assert!(split_list("").is_empty());
    }
}
