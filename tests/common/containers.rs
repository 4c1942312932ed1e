// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Testcontainers setup for MySQL.
//!
//! Provides helpers to spin up a MySQL server for link tests.

use replication_prefetch::ConnectionConfig;
use testcontainers::{clients::Cli, core::WaitFor, Container, GenericImage};

pub const MYSQL_ROOT_PASSWORD: &str = "prefetch";

/// Create a MySQL 8 container.
///
/// The entrypoint starts a temporary server first; wait for the final one,
/// which is the only one listening on 3306.
pub fn mysql_container(docker: &Cli) -> Container<'_, GenericImage> {
    let image = GenericImage::new("mysql", "8.0")
        .with_env_var("MYSQL_ROOT_PASSWORD", MYSQL_ROOT_PASSWORD)
        .with_env_var("MYSQL_DATABASE", "prefetch_test")
        .with_exposed_port(3306)
        .with_wait_for(WaitFor::message_on_stderr("port: 3306  MySQL Community Server"));
    docker.run(image)
}

/// Connection settings for a container.
pub fn mysql_connection(container: &Container<'_, GenericImage>) -> ConnectionConfig {
    let port = container.get_host_port_ipv4(3306);
    ConnectionConfig {
        password: MYSQL_ROOT_PASSWORD.to_string(),
        ..ConnectionConfig::for_testing("127.0.0.1", port)
    }
}
