// Copyright 2025 Overhead Bench Contributors
// SPDX-License-Identifier: Apache-2.0

//! Compose descriptor of one run.
//!
//! The descriptor is a pure function of the benchmark config, the variant,
//! the settings and the artifact directory. Services are kept in a
//! `BTreeMap` so the rendered YAML is byte-stable.

use overhead_bench_core::{BenchmarkConfig, RunVariant, Settings};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::layout::{container_name, project_name};

/// Service under test.
pub const APP_SERVICE: &str = "app";
/// Load generator; its exit code is the run's exit code.
pub const LOADGEN_SERVICE: &str = "loadgen";
/// Container resource poller.
pub const CADVISOR_SERVICE: &str = "cadvisor";
/// Mock ingestion sidecar.
pub const RELAY_SERVICE: &str = "relay";

/// Port the app listens on inside the compose network.
pub const APP_PORT: u16 = 8080;
/// Mount point of the artifact directory in the load generator.
pub const RESULT_MOUNT: &str = "/result";
/// Resource poller image.
pub const CADVISOR_IMAGE: &str = "gcr.io/cadvisor/cadvisor:v0.39.2";

/// Image build instructions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Build {
    /// Build context
    pub context: PathBuf,
    /// Dockerfile name, relative to the context
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dockerfile: Option<String>,
}

/// One compose service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Service {
    /// Built image
    #[serde(skip_serializing_if = "Option::is_none")]
    pub build: Option<Build>,
    /// Prebuilt image
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// Fixed container name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container_name: Option<String>,
    /// Environment
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub environment: BTreeMap<String, String>,
    /// `host:container[:mode]` mounts
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<String>,
    /// Services started first
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    /// Extended privileges
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub privileged: bool,
}

/// A compose file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComposeDescriptor {
    /// Services by name
    pub services: BTreeMap<String, Service>,
}

impl ComposeDescriptor {
    /// Build the descriptor of `variant`.
    ///
    /// `dockerfile` is the name found in the variant directory and
    /// `artifact_dir` the directory mounted into the load generator.
    pub fn for_run(
        cfg: &BenchmarkConfig,
        variant: &RunVariant,
        settings: &Settings,
        dockerfile: &str,
        artifact_dir: &Path,
    ) -> Self {
        let project = project_name(cfg, variant);
        let app_container = container_name(&project, APP_SERVICE);
        let mut services = BTreeMap::new();

        services.insert(
            APP_SERVICE.to_string(),
            Service {
                build: Some(Build {
                    context: cfg.variant_dir(variant),
                    dockerfile: Some(dockerfile.to_string()),
                }),
                container_name: Some(app_container.clone()),
                ..Service::default()
            },
        );

        let mut depends_on = vec![APP_SERVICE.to_string(), CADVISOR_SERVICE.to_string()];
        if variant.requires_sidecar {
            depends_on.push(RELAY_SERVICE.to_string());
            services.insert(
                RELAY_SERVICE.to_string(),
                Service {
                    build: Some(Build {
                        context: settings.relay_context.clone(),
                        dockerfile: None,
                    }),
                    ..Service::default()
                },
            );
        }

        let platform = &cfg.platform_config;
        let environment = BTreeMap::from([
            ("RESULT_PATH".to_string(), RESULT_MOUNT.to_string()),
            (
                "TARGET_URL".to_string(),
                format!("http://{}:{}{}", APP_SERVICE, APP_PORT, platform.target.path),
            ),
            ("RPS".to_string(), platform.rps.to_string()),
            ("TEST_DURATION".to_string(), platform.duration.clone()),
            ("TARGET_CONTAINER_NAME".to_string(), app_container),
            ("HAS_RELAY".to_string(), variant.requires_sidecar.to_string()),
        ]);
        services.insert(
            LOADGEN_SERVICE.to_string(),
            Service {
                build: Some(Build {
                    context: settings.loadgen_context.clone(),
                    dockerfile: None,
                }),
                environment,
                volumes: vec![format!("{}:{}", artifact_dir.display(), RESULT_MOUNT)],
                depends_on,
                ..Service::default()
            },
        );

        services.insert(
            CADVISOR_SERVICE.to_string(),
            Service {
                image: Some(CADVISOR_IMAGE.to_string()),
                volumes: vec![
                    "/:/rootfs:ro".to_string(),
                    "/var/run:/var/run:ro".to_string(),
                    "/sys:/sys:ro".to_string(),
                    "/var/lib/docker/:/var/lib/docker:ro".to_string(),
                    "/dev/disk/:/dev/disk:ro".to_string(),
                ],
                privileged: true,
                ..Service::default()
            },
        );

        Self { services }
    }

    /// Render as YAML.
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }
}
