use crate::config::CaptionStyle;

use super::{CaptionCue, CaptionTrack};

const STYLE_NAME: &str = "Karaoke";

/// Render an ASS script with one dialogue line per cue.
///
/// Words are upper-cased and prefixed with `{\kN}` so the renderer sweeps
/// the highlight color across them in sync; pauses inside a cue are
/// emitted as bare `{\kN}` tags.
pub fn render(track: &CaptionTrack, style: &CaptionStyle, resolution: (u32, u32)) -> String {
    let mut content = header(style, resolution);
    for cue in track.cues() {
        content.push_str(&format!(
            "Dialogue: 0,{},{},{STYLE_NAME},,0,0,0,,{}\n",
            ass_timestamp(cue.start_offset),
            ass_timestamp(cue.end_offset),
            dialogue_text(cue)
        ));
    }
    content
}

fn header(style: &CaptionStyle, (width, height): (u32, u32)) -> String {
    // Sung text takes PrimaryColour; text waiting for its \k turn shows SecondaryColour.
    format!(
        "[Script Info]\nScriptType: v4.00+\nPlayResX: {width}\nPlayResY: {height}\nWrapStyle: 2\nScaledBorderAndShadow: yes\n\n\
[V4+ Styles]\nFormat: Name, Fontname, Fontsize, PrimaryColour, SecondaryColour, OutlineColour, BackColour, Bold, Italic, Underline, StrikeOut, ScaleX, ScaleY, Spacing, Angle, BorderStyle, Outline, Shadow, Alignment, MarginL, MarginR, MarginV, Encoding\n\
Style: {STYLE_NAME},{font},{size},{highlight},{primary},{outline},&H80000000,{bold},0,0,0,100,100,0,0,1,{outline_width},0,2,60,60,{margin_v},1\n\n\
[Events]\nFormat: Layer, Start, End, Style, Name, MarginL, MarginR, MarginV, Effect, Text\n",
        font = style.font_name,
        size = style.font_size,
        highlight = ass_color(&style.highlight_color),
        primary = ass_color(&style.primary_color),
        outline = ass_color(&style.outline_color),
        bold = if style.bold { -1 } else { 0 },
        outline_width = style.outline_width,
        margin_v = style.margin_v,
    )
}

fn dialogue_text(cue: &CaptionCue) -> String {
    let word_count = cue.words().count();
    let mut text = String::new();
    let mut words_seen = 0;
    for segment in &cue.segments {
        text.push_str(&format!("{{\\k{}}}", segment.centiseconds));
        if segment.is_pause() {
            continue;
        }
        text.push_str(&sanitize_ass_text(&segment.text.to_uppercase()));
        words_seen += 1;
        if words_seen < word_count {
            text.push(' ');
        }
    }
    text
}

/// Override blocks open with `{` and tags with `\`; neither may leak from a word
fn sanitize_ass_text(value: &str) -> String {
    value
        .chars()
        .map(|ch| match ch {
            '{' => '(',
            '}' => ')',
            '\\' => '/',
            '\n' | '\r' => ' ',
            other => other,
        })
        .collect()
}

/// Format seconds as an ASS timestamp (H:MM:SS.cc)
pub fn ass_timestamp(seconds: f64) -> String {
    let total_cs = (seconds.max(0.0) * 100.0).round() as u64;
    let cs = total_cs % 100;
    let total_secs = total_cs / 100;
    let secs = total_secs % 60;
    let total_mins = total_secs / 60;
    let mins = total_mins % 60;
    let hours = total_mins / 60;
    format!("{hours}:{mins:02}:{secs:02}.{cs:02}")
}

/// `RRGGBB` hex to ASS `&HAABBGGRR`; unparseable input falls back to white
pub fn ass_color(hex: &str) -> String {
    let hex = hex.trim().trim_start_matches('#');
    let channel = |range: std::ops::Range<usize>| {
        hex.get(range).and_then(|part| u8::from_str_radix(part, 16).ok())
    };
    match (hex.len(), channel(0..2), channel(2..4), channel(4..6)) {
        (6, Some(r), Some(g), Some(b)) => format!("&H00{:02X}{:02X}{:02X}", b, g, r),
        _ => "&H00FFFFFF".to_string(),
    }
}
