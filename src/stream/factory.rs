//! # Stream type factories.
//!
//! Each source type registers a factory that builds and starts a
//! [`StreamEntity`]. Process-backed types check at registration time that
//! their helper executable is actually reachable, so a missing binary
//! surfaces as a `LaunchError` immediately instead of at the first create.

use std::sync::Arc;

use crate::controller::ServiceContext;
use crate::error::{Error, Result};
use crate::process::executable_reachable;
use crate::registry::{Factory, Registry};
use crate::stream::{StreamConfig, StreamEntity};

/// Default executable of the RTSP source helper.
pub const RTSP_EXECUTABLE: &str = "stsw_rtsp_source";
/// Default executable of the proxy source helper.
pub const PROXY_EXECUTABLE: &str = "stsw_proxy_source";
/// Default executable of the file live source helper.
pub const FILE_LIVE_EXECUTABLE: &str = "stsw_file_live_source";

/// Registers a process-backed source type running `executable`.
pub fn register_process_source_type(
    registry: &Registry<StreamConfig, StreamEntity>,
    ctx: ServiceContext,
    type_name: &str,
    executable: &str,
) -> Result<()> {
    if !executable_reachable(executable) {
        return Err(Error::Launch {
            program: executable.to_string(),
            reason: "executable not found".to_string(),
        });
    }
    let type_name_owned = type_name.to_string();
    let executable = executable.to_string();
    let factory: Factory<StreamConfig, StreamEntity> = Arc::new(move |name, config| {
        let ctx = ctx.clone();
        let type_name = type_name_owned.clone();
        let executable = executable.clone();
        Box::pin(async move {
            let entity = StreamEntity::new(name, type_name, config, Some(executable), &ctx)?;
            entity.start().await?;
            Ok(entity)
        })
    });
    registry.register_type(type_name, factory)
}

/// Registers a passive source type: the helper is launched externally and
/// only the control channel is used.
pub fn register_passive_source_type(
    registry: &Registry<StreamConfig, StreamEntity>,
    ctx: ServiceContext,
    type_name: &str,
) -> Result<()> {
    let type_name_owned = type_name.to_string();
    let factory: Factory<StreamConfig, StreamEntity> = Arc::new(move |name, config| {
        let ctx = ctx.clone();
        let type_name = type_name_owned.clone();
        Box::pin(async move {
            let entity = StreamEntity::new(name, type_name, config, None, &ctx)?;
            entity.start().await?;
            Ok(entity)
        })
    });
    registry.register_type(type_name, factory)
}

/// Registers the built-in source types (`rtsp`, `proxy`,
/// `file_live_source`) with their default executables.
///
/// Fails with `LaunchError` if any helper executable is missing.
pub fn register_builtin_source_types(
    registry: &Registry<StreamConfig, StreamEntity>,
    ctx: &ServiceContext,
) -> Result<()> {
    for (type_name, executable) in [
        ("rtsp", RTSP_EXECUTABLE),
        ("proxy", PROXY_EXECUTABLE),
        ("file_live_source", FILE_LIVE_EXECUTABLE),
    ] {
        register_process_source_type(registry, ctx.clone(), type_name, executable)?;
    }
    Ok(())
}
