//! Serial port listing.

use {
    anyhow::Result,
    console::style,
    iqrf_ota::{DetectedPort, auto_detect_port, detect_ports},
    serde_json::{Value, json},
};

fn ports_json(ports: &[DetectedPort]) -> Value {
    let ports: Vec<Value> = ports
        .iter()
        .map(|p| {
            json!({
                "name": p.name,
                "device": p.device.name(),
                "known": p.device.is_known(),
                "vid": p.vid,
                "pid": p.pid,
                "manufacturer": p.manufacturer,
                "product": p.product,
                "serial": p.serial,
            })
        })
        .collect();
    json!({ "ok": true, "data": { "ports": ports } })
}

/// List ports command implementation.
pub(crate) fn cmd_list_ports(json: bool) -> Result<()> {
    let detected = detect_ports();

    if json {
        println!("{}", serde_json::to_string_pretty(&ports_json(&detected))?);
        return Ok(());
    }

    eprintln!("{}", style("Available serial ports").bold().underlined());
    if detected.is_empty() {
        eprintln!("  {}", style("No serial ports found").dim());
        return Ok(());
    }

    for port in &detected {
        let device_type = if port.device.is_known() {
            format!(" [{}]", style(port.device.name()).yellow())
        } else {
            String::new()
        };
        let vid_pid = match (port.vid, port.pid) {
            (Some(vid), Some(pid)) => format!(" ({vid:04X}:{pid:04X})"),
            _ => String::new(),
        };
        let product = port
            .product
            .as_deref()
            .map(|p| format!(" - {}", style(p).dim()))
            .unwrap_or_default();
        eprintln!(
            "  {} {}{device_type}{vid_pid}{product}",
            style("•").green(),
            style(&port.name).cyan()
        );
    }

    if let Ok(auto_port) = auto_detect_port() {
        eprintln!(
            "\n{} Auto-detected coordinator port: {}",
            style("→").green().bold(),
            style(&auto_port.name).cyan().bold()
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use iqrf_ota::DeviceKind;

    #[test]
    fn test_ports_json_shape() {
        let ports = vec![DetectedPort {
            name: "/dev/ttyACM0".to_string(),
            device: DeviceKind::Iqrf,
            vid: Some(0x1DE6),
            pid: Some(0x0003),
            manufacturer: Some("MICRORISC s.r.o.".to_string()),
            product: Some("GW-USB-06".to_string()),
            serial: None,
        }];
        let doc = ports_json(&ports);
        assert_eq!(doc["ok"], true);
        let port = &doc["data"]["ports"][0];
        assert_eq!(port["name"], "/dev/ttyACM0");
        assert_eq!(port["device"], "IQRF USB");
        assert_eq!(port["known"], true);
        assert_eq!(port["vid"], 0x1DE6);
        assert!(port["serial"].is_null());
    }

    #[test]
    fn test_ports_json_empty() {
        let doc = ports_json(&[]);
        assert!(doc["data"]["ports"].as_array().unwrap().is_empty());
    }
}
