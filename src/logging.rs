use owo_colors::OwoColorize;
use serde::{Deserialize, Serialize};
use std::{
    fmt,
    sync::atomic::{AtomicBool, Ordering},
};
use time::{format_description::FormatItem, macros::format_description, OffsetDateTime};
use tracing::{Level, Subscriber};
use tracing_subscriber::{
    fmt::{format::Writer, FmtContext, FormatEvent, FormatFields},
    registry::LookupSpan,
};

const GENERATION_TARGET: &str = "copyforge::generation";
const PREVIEW_CHAR_LIMIT: usize = 160;
const TARGET_GUTTER_WIDTH: usize = 24;
const TIMESTAMP_FORMAT: &[FormatItem<'_>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");

static LOGS_USE_COLOR: AtomicBool = AtomicBool::new(true);

/// One completed generation, rendered as a block under the log line so the
/// brief and the produced copy can be eyeballed together.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRecord {
    pub provider: String,
    pub rapport: String,
    pub reasons: String,
    pub results: String,
    pub output: String,
}

impl GenerationRecord {
    pub fn new(
        provider: impl Into<String>,
        rapport: String,
        reasons: String,
        results: String,
        output: String,
    ) -> Self {
        Self {
            provider: provider.into(),
            rapport,
            reasons,
            results,
            output,
        }
    }

    pub fn render_pretty(&self, use_color: bool) -> String {
        let mut lines = Vec::new();
        lines.push(format!("┌─ Copy Generation (provider: {})", self.provider));
        push_body_line(
            &mut lines,
            format!("RAPPORT : {}", preview_value(&self.rapport, use_color)),
        );
        push_body_line(
            &mut lines,
            format!("REASONS : {}", preview_value(&self.reasons, use_color)),
        );
        push_body_line(
            &mut lines,
            format!("RESULTS : {}", preview_value(&self.results, use_color)),
        );
        push_body_line(
            &mut lines,
            format!("OUT     : {}", preview_value(&self.output, use_color)),
        );
        lines.push("└─".to_string());

        lines.join("\n")
    }
}

fn escape_fragment(value: &str) -> String {
    let mut rendered = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '\n' => rendered.push('⏎'),
            '\t' => rendered.push('⇥'),
            '\r' => rendered.push_str("␍"),
            c if c.is_control() => rendered.push_str(&format!("\\u{{{:04X}}}", c as u32)),
            c => rendered.push(c),
        }
    }
    rendered
}

fn push_body_line(lines: &mut Vec<String>, content: String) {
    lines.push(format!("│ {}", content));
}

fn preview_value(value: &str, use_color: bool) -> String {
    let mut preview: String = value.chars().take(PREVIEW_CHAR_LIMIT).collect();
    if value.chars().count() > PREVIEW_CHAR_LIMIT {
        preview.push_str("...");
    }
    let escaped = escape_fragment(&preview);
    if use_color {
        escaped.cyan().to_string()
    } else {
        escaped
    }
}

#[derive(Debug, Default)]
struct GenerationEventVisitor {
    generation_json: Option<String>,
}

impl tracing::field::Visit for GenerationEventVisitor {
    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        if field.name() == "generation_json" {
            self.generation_json = Some(value.to_string());
        }
    }

    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn fmt::Debug) {
        if field.name() == "generation_json" && self.generation_json.is_none() {
            self.generation_json = Some(format!("{value:?}"));
        }
    }
}

pub struct GenerationFormatter;

impl Default for GenerationFormatter {
    fn default() -> Self {
        Self
    }
}

impl GenerationFormatter {
    pub fn new() -> Self {
        Self
    }
}

impl<S, N> FormatEvent<S, N> for GenerationFormatter
where
    S: Subscriber + for<'lookup> LookupSpan<'lookup>,
    N: for<'writer> FormatFields<'writer> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> fmt::Result {
        let metadata = event.metadata();
        let use_color = writer.has_ansi_escapes();

        LOGS_USE_COLOR.store(use_color, Ordering::Relaxed);

        write_prefix(&mut writer, metadata, use_color)?;
        ctx.format_fields(writer.by_ref(), event)?;
        writer.write_char('\n')?;

        if metadata.target() == GENERATION_TARGET {
            let mut visitor = GenerationEventVisitor::default();
            event.record(&mut visitor);
            if let Some(json) = visitor.generation_json {
                match serde_json::from_str::<GenerationRecord>(&json) {
                    Ok(record) => {
                        writer.write_str(&record.render_pretty(use_color))?;
                        writer.write_char('\n')?;
                    }
                    Err(err) => {
                        writer.write_str("│ Failed to render generation record: ")?;
                        writer.write_str(&err.to_string())?;
                        writer.write_char('\n')?;
                    }
                }
            }
        }

        Ok(())
    }
}

pub fn record_generation(record: GenerationRecord) {
    if !tracing::level_enabled!(tracing::Level::DEBUG) {
        return;
    }
    if let Ok(json) = serde_json::to_string(&record) {
        tracing::event!(
            target: GENERATION_TARGET,
            tracing::Level::DEBUG,
            generation_json = json.as_str(),
            provider = record.provider.as_str(),
            "copy generated"
        );
    } else {
        tracing::event!(
            target: GENERATION_TARGET,
            tracing::Level::DEBUG,
            "copy generated (serialization failure)"
        );
    }
}

pub fn logs_use_color() -> bool {
    LOGS_USE_COLOR.load(Ordering::Relaxed)
}

fn write_prefix(
    writer: &mut Writer<'_>,
    metadata: &tracing::Metadata<'_>,
    use_color: bool,
) -> fmt::Result {
    let timestamp_plain = format_timestamp();
    let timestamp_display = if use_color {
        timestamp_plain.as_str().dimmed().to_string()
    } else {
        timestamp_plain
    };
    writer.write_str(&timestamp_display)?;

    let level_plain = format!("{:>5}", metadata.level());
    let level_has_leading_space = level_plain.starts_with(' ');
    let level_display = if use_color {
        color_level(&level_plain, *metadata.level())
    } else {
        level_plain.clone()
    };
    if level_has_leading_space {
        writer.write_str(&level_display)?;
    } else {
        writer.write_char(' ')?;
        writer.write_str(&level_display)?;
    }
    writer.write_char(' ')?;

    let target_text = format!("{:<width$}", metadata.target(), width = TARGET_GUTTER_WIDTH);
    let target_text = if use_color {
        target_text.blue().dimmed().to_string()
    } else {
        target_text
    };
    writer.write_str(&target_text)?;
    writer.write_str(": ")?;

    Ok(())
}

fn color_level(text: &str, level: Level) -> String {
    match level {
        Level::ERROR => text.red().bold().to_string(),
        Level::WARN => text.yellow().bold().to_string(),
        Level::INFO => text.green().to_string(),
        Level::DEBUG => text.cyan().to_string(),
        Level::TRACE => text.dimmed().to_string(),
    }
}

fn format_timestamp() -> String {
    let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
    now.format(&TIMESTAMP_FORMAT)
        .unwrap_or_else(|_| "0000-00-00 00:00:00".to_string())
}
