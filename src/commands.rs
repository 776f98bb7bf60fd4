//! Host-facing command surface. Arguments arrive the way the host runtime
//! marshals them across the foreign-function boundary: loosely typed JSON.

use base64::Engine;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::io::ReadListener;
use crate::probe::DeviceSelector;
use crate::session::{ConnectionParameters, Result, SerialError};
use crate::SerialCore;

fn parse<T: for<'de> Deserialize<'de>>(args: Value) -> Result<T> {
    serde_json::from_value(args).map_err(|e| SerialError::Parameter(e.to_string()))
}

/// requestSerialPermissions: probe, select, and await authorization. Without
/// a selector the built-in probe table is used.
pub async fn request_serial_permissions(core: &SerialCore, args: Value) -> Result<Value> {
    let no_selector =
        args.is_null() || args.as_object().map_or(false, |map| map.is_empty());
    let selector = if no_selector {
        None
    } else {
        Some(parse::<DeviceSelector>(args)?)
    };
    let outcome = core.request_permission(selector).await?;
    Ok(json!({ "granted": outcome.granted }))
}

/// openConnection: open the selected device with the given parameters.
pub async fn open_connection(core: &SerialCore, args: Value) -> Result<()> {
    let parameters: ConnectionParameters = if args.is_null() {
        ConnectionParameters::default()
    } else {
        parse(args)?
    };
    core.session().open(parameters).await
}

/// closeConnection: idempotent.
pub async fn close_connection(core: &SerialCore) -> Result<()> {
    core.session().close().await
}

#[derive(Debug, Default, Deserialize)]
struct WriteArgs {
    #[serde(default)]
    data: Option<String>,
}

/// write: the closed-port check runs before the payload check.
pub async fn write(core: &SerialCore, args: Value) -> Result<()> {
    let args: WriteArgs = parse(args)?;
    if !core.session().is_open().await {
        return Err(SerialError::PortClosed);
    }
    let data = args
        .data
        .ok_or_else(|| SerialError::Parameter("data is required".into()))?;
    core.session().write(data.as_bytes()).await
}

/// writeHexadecimal: same contract as write, payload decoded from hex text.
pub async fn write_hexadecimal(core: &SerialCore, args: Value) -> Result<()> {
    let args: WriteArgs = parse(args)?;
    if !core.session().is_open().await {
        return Err(SerialError::PortClosed);
    }
    let data = args
        .data
        .ok_or_else(|| SerialError::Parameter("data is required".into()))?;
    core.session().write_hex(&data).await
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ReadArgs {
    read_raw: bool,
}

/// read: one-shot poll; `readRaw` selects base64 framing for binary-safe
/// delivery, otherwise the bytes are returned as UTF-8 text.
pub async fn read(core: &SerialCore, args: Value) -> Result<Value> {
    let args: ReadArgs = if args.is_null() {
        ReadArgs::default()
    } else {
        parse(args)?
    };
    let bytes = core.session().read_once().await?;
    let data = if args.read_raw {
        base64::engine::general_purpose::STANDARD.encode(&bytes)
    } else {
        String::from_utf8_lossy(&bytes).into_owned()
    };
    Ok(json!({ "data": data }))
}

pub fn register_read_callback(core: &SerialCore, listener: ReadListener) {
    core.session().register_read_callback(listener);
}

pub fn unregister_read_callback(core: &SerialCore) {
    core.session().unregister_read_callback();
}

pub fn register_read_raw_callback(core: &SerialCore, listener: ReadListener) {
    core.session().register_read_raw_callback(listener);
}

pub fn unregister_read_raw_callback(core: &SerialCore) {
    core.session().unregister_read_raw_callback();
}
