//! Upload, verify and load command implementation.

use {
    crate::{Cli, CliError, OtaArgs, config::Config, get_port, use_fancy_output},
    anyhow::Result,
    console::style,
    indicatif::{ProgressBar, ProgressStyle},
    iqrf_ota::{
        LoadingAction, NativePort, OtaRequest, OtaUploader, Transaction, UartTransport,
        UploadResult,
    },
    serde_json::{Value, json},
    std::{
        collections::BTreeMap,
        path::{Path, PathBuf},
    },
};

/// Build the request and the directory the file is resolved against.
fn build_request(
    action: LoadingAction,
    args: &OtaArgs,
    config: &Config,
) -> Result<(OtaRequest, PathBuf)> {
    let file_name = args
        .file
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| CliError::Usage(format!("Invalid file name: {}", args.file.display())))?;

    // Bare names not present locally come from the upload directory
    let upload_dir = match args.file.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ if args.file.exists() => PathBuf::from("."),
        _ => config.ota.upload_dir(),
    };

    let mut request = OtaRequest::new(action, file_name)
        .with_device_addr(args.address)
        .with_hwpid(args.hwpid)
        .with_start_mem_addr(args.start_addr)
        .with_upload_eeprom_data(args.upload_eeprom || config.ota.upload_eeprom_data)
        .with_upload_eeeprom_data(args.upload_eeeprom || config.ota.upload_eeeprom_data);
    if let Some(repeat) = args.repeat.or(config.ota.repeat) {
        request = request.with_repeat(repeat);
    }
    Ok((request, upload_dir))
}

/// Checks made before a port is opened.
fn preflight(request: &OtaRequest, path: &Path) -> iqrf_ota::Result<()> {
    request.validate()?;
    if !path.is_file() {
        return Err(iqrf_ota::Error::Image(format!(
            "File not found: {}",
            path.display()
        )));
    }
    Ok(())
}

/// Upload, verify or load command implementation.
pub(crate) fn cmd_ota(
    cli: &Cli,
    config: &mut Config,
    action: LoadingAction,
    args: &OtaArgs,
) -> Result<()> {
    let (request, upload_dir) = build_request(action, args, config)?;
    let path = upload_dir.join(&request.file_name);
    if let Err(e) = preflight(&request, &path) {
        if args.json {
            let mut result = UploadResult::new(&request);
            result.fail(&e);
            println!("{}", serde_json::to_string_pretty(&result_json(&result, false))?);
        }
        return Err(match e {
            iqrf_ota::Error::InvalidRequest(message) => CliError::Usage(message).into(),
            other => other.into(),
        });
    }
    let port_name = get_port(cli, config)?;
    let baud = crate::baud_rate(cli, config);

    if !cli.quiet {
        eprintln!(
            "{} {} {} via {} @ {baud}",
            style("⏳").yellow(),
            action,
            style(&request.file_name).cyan(),
            style(&port_name).cyan()
        );
    }

    let port = NativePort::open_simple(&port_name, baud)?;
    let mut transport = UartTransport::new(port);
    if let Some(timeout) = config.ota.timeout() {
        transport = transport.with_default_timeout(timeout);
    }
    let mut uploader = OtaUploader::new(transport, upload_dir);

    let pb = if cli.quiet || args.json || !use_fancy_output() {
        ProgressBar::hidden()
    } else {
        let pb = ProgressBar::new(0);
        #[allow(clippy::unwrap_used)] // Static template string
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}")
                .unwrap()
                .progress_chars("#>-"),
        );
        pb.set_draw_target(indicatif::ProgressDrawTarget::stderr());
        pb
    };

    let result = uploader.process_with_progress(&request, &mut |phase, current, total| {
        pb.set_message(phase.to_string());
        pb.set_length(total as u64);
        pb.set_position(current as u64);
    });
    pb.finish_and_clear();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result_json(&result, args.raw))?);
    } else if !cli.quiet {
        print_result(&result, args.raw);
    }

    if result.is_ok() {
        Ok(())
    } else {
        Err(CliError::Request {
            status: result.status.code(),
            message: result.status_str,
        }
        .into())
    }
}

/// Dot-separated lowercase hex, e.g. `00.00.02.0d.ff.ff`.
fn dot_hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(".")
}

fn node_results(map: &BTreeMap<u8, bool>) -> Value {
    map.iter()
        .map(|(address, result)| json!({ "address": address, "result": result }))
        .collect()
}

fn raw_json(transaction: &Transaction) -> Value {
    json!({
        "attempt": transaction.attempt,
        "request": dot_hex(&transaction.request),
        "response": transaction.response.as_deref().map(dot_hex),
        "error": transaction.error,
    })
}

/// JSON document describing the outcome of a request.
fn result_json(result: &UploadResult, raw: bool) -> Value {
    let mut doc = json!({
        "deviceAddr": result.device_addr,
        "hwpId": result.hwpid,
        "loadingAction": result.action.as_str(),
    });
    if let Some(uploaded) = result.upload_result {
        doc["uploadResult"] = json!(uploaded);
    }
    if result.action != LoadingAction::Upload {
        doc["verifyResult"] = node_results(&result.verify);
    }
    if result.action == LoadingAction::Load {
        doc["loadResult"] = node_results(&result.load);
    }
    if raw {
        doc["raw"] = result.transactions.iter().map(raw_json).collect();
    }
    doc["status"] = json!(result.status.code());
    doc["statusStr"] = json!(result.status_str);
    doc
}

fn mark(ok: bool) -> console::StyledObject<&'static str> {
    if ok {
        style("✓").green()
    } else {
        style("✗").red()
    }
}

fn print_nodes(label: &str, map: &BTreeMap<u8, bool>) {
    if map.is_empty() {
        return;
    }
    let passed = map.values().filter(|ok| **ok).count();
    eprintln!("  {label}: {passed}/{} node(s)", map.len());
    for (address, ok) in map {
        eprintln!("    {} {address:>3}", mark(*ok));
    }
}

fn print_result(result: &UploadResult, raw: bool) {
    eprintln!(
        "\n{} {} to {} (HWPID {:#06x})",
        style("OTA").bold().underlined(),
        result.action,
        result.device_addr,
        result.hwpid
    );
    if let Some(uploaded) = result.upload_result {
        eprintln!("  {} upload", mark(uploaded));
    }
    print_nodes("verify", &result.verify);
    print_nodes("load", &result.load);
    if raw {
        for transaction in &result.transactions {
            eprintln!(
                "  {} #{} {} -> {}",
                mark(transaction.is_success()),
                transaction.attempt,
                dot_hex(&transaction.request),
                transaction
                    .response
                    .as_deref()
                    .map_or_else(|| transaction.error.clone().unwrap_or_default(), dot_hex)
            );
        }
    }
    if result.is_ok() {
        eprintln!("\n{} {}", style("✓").green().bold(), result.status_str);
    }
}
