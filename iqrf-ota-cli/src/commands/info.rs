//! Offline image inspection.

use {
    anyhow::{Context, Result},
    console::style,
    iqrf_ota::{
        ContentType, ParsedImage, PreparedData, TrFamily,
        image::{ChunkLayout, CodeBlock, HexImageParser, ImageParser, PluginImageParser},
    },
    serde_json::{Value, json},
    std::path::Path,
};

/// Parsed image with the upload figures for both chunk layouts.
#[derive(Debug)]
struct ImageSummary {
    content_type: ContentType,
    image: ParsedImage,
    unicast: PreparedData,
    broadcast: PreparedData,
}

fn summarize(path: &Path) -> Result<ImageSummary> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let content_type = ContentType::from_file_name(&file_name)?;
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let image = match content_type {
        ContentType::Hex => HexImageParser::new(&file_name).parse_image(&contents)?,
        ContentType::Plugin => PluginImageParser::new(&file_name).parse_image(&contents)?,
    };
    let unicast = PreparedData::from_image(content_type, &image, ChunkLayout::MostEffective)?;
    let broadcast = PreparedData::from_image(content_type, &image, ChunkLayout::Fixed16)?;

    Ok(ImageSummary {
        content_type,
        image,
        unicast,
        broadcast,
    })
}

/// Family name for a header family code.
fn family_name(code: u8) -> String {
    [
        TrFamily::Tr5xD,
        TrFamily::Tr7xD,
        TrFamily::Tr7xG,
        TrFamily::Tr8xG,
    ]
    .into_iter()
    .find(|f| f.code() == Some(code))
    .map_or_else(|| format!("unknown ({code})"), |f| f.to_string())
}

fn blocks_json(blocks: &[CodeBlock]) -> Value {
    blocks
        .iter()
        .map(|b| json!({ "start": b.start_addr(), "end": b.end_addr(), "size": b.len() }))
        .collect()
}

fn prepared_json(data: &PreparedData) -> Value {
    json!({
        "length": data.length,
        "checksum": data.checksum,
        "chunks": data.chunks.len(),
        "bytes": data.total_bytes(),
    })
}

fn info_json(summary: &ImageSummary) -> Value {
    let header = summary.image.header.map(|h| {
        json!({
            "mcuType": h.mcu_type,
            "trFamily": family_name(h.radio_series),
        })
    });
    json!({
        "contentType": summary.content_type.name(),
        "header": header,
        "os": summary.image.os_tokens.iter().map(ToString::to_string).collect::<Vec<_>>(),
        "flash": blocks_json(&summary.image.flash),
        "eeprom": blocks_json(&summary.image.eeprom),
        "eeeprom": blocks_json(&summary.image.eeeprom),
        "unicast": prepared_json(&summary.unicast),
        "broadcast": prepared_json(&summary.broadcast),
    })
}

fn print_blocks(label: &str, blocks: &[CodeBlock]) {
    for block in blocks {
        eprintln!(
            "  {:<10} {:#06x}-{:#06x} ({} bytes)",
            label,
            block.start_addr(),
            block.end_addr(),
            block.len()
        );
    }
}

/// Info command implementation.
pub(crate) fn cmd_info(path: &Path, json: bool) -> Result<()> {
    let summary = summarize(path)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&info_json(&summary))?);
        return Ok(());
    }

    eprintln!("\n{}", style(path.display()).bold().underlined());
    eprintln!("  Type:      {}", style(summary.content_type.name()).cyan());
    if let Some(header) = summary.image.header {
        eprintln!(
            "  Target:    MCU {} / {}",
            header.mcu_type,
            family_name(header.radio_series)
        );
    }
    if !summary.image.os_tokens.is_empty() {
        let tokens: Vec<String> = summary.image.os_tokens.iter().map(ToString::to_string).collect();
        eprintln!("  OS:        {}", tokens.join(", "));
    }
    print_blocks("Flash", &summary.image.flash);
    print_blocks("EEPROM", &summary.image.eeprom);
    print_blocks("EEEPROM", &summary.image.eeeprom);
    for (label, data) in [("Unicast", &summary.unicast), ("Broadcast", &summary.broadcast)] {
        eprintln!(
            "  {label:<10} length {:#06x}, checksum {:#06x}, {} chunk(s)",
            data.length,
            data.checksum,
            data.chunks.len()
        );
    }
    Ok(())
}
