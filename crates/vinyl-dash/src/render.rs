//! Plain-text rendering of a dashboard snapshot, for the console front-end.

use std::fmt::Write;

use crate::collection::{ExpandableCollection, RankedListItem};
use crate::state::{DashboardState, StatsList};
use crate::visibility::Visibility;

pub fn render(state: &DashboardState) -> String {
    let mut out = String::new();
    // Writing to a String cannot fail.
    let _ = write_dashboard(&mut out, state);
    out
}

fn write_dashboard(out: &mut String, s: &DashboardState) -> std::fmt::Result {
    if s.visibility == Visibility::Hidden {
        writeln!(out, "(hidden, polling paused)")?;
    }

    writeln!(out, "── Now playing")?;
    writeln!(out, "  {}", s.now_playing.title)?;
    if !s.now_playing.artist.is_empty() {
        writeln!(out, "  {}", s.now_playing.artist)?;
    }
    if !s.now_playing.album.is_empty() {
        writeln!(out, "  {}", s.now_playing.album)?;
    }
    writeln!(out, "  cover: {}", s.now_playing.cover_url)?;

    let rec = &s.recognizer;
    writeln!(
        out,
        "── Recognizer [{}]{} {}",
        if rec.toggle_on { "on" } else { "off" },
        if rec.toggle_enabled { "" } else { " (busy)" },
        rec.status_text
    )?;

    let dev = &s.device;
    writeln!(out, "── Pixoo")?;
    writeln!(out, "  {}", dev.status_text)?;
    if !dev.status_sub.is_empty() {
        writeln!(out, "  {}", dev.status_sub)?;
    }
    let pending = |p: bool| if p { " *" } else { "" };
    match dev.brightness.displayed() {
        Some(b) => writeln!(out, "  brightness {}%{}", b, pending(dev.brightness.is_provisional()))?,
        None => writeln!(out, "  brightness -")?,
    }
    match dev.channel.displayed() {
        Some(c) => writeln!(out, "  channel {}{}", c, pending(dev.channel.is_provisional()))?,
        None => writeln!(out, "  channel -")?,
    }
    for line in [&dev.command_status, &dev.discover_status, &dev.reboot_status] {
        if !line.is_empty() {
            writeln!(out, "  {}", line)?;
        }
    }
    if !dev.reboot_enabled {
        writeln!(out, "  reboot unavailable")?;
    }
    if let Some(at) = dev.refreshed_at {
        writeln!(out, "  updated {}", at.format("%H:%M:%S"))?;
    }

    if s.lyrics.visible {
        writeln!(out, "── Lyrics")?;
        let text = &s.lyrics.text;
        if s.lyrics.toggle_visible && s.lyrics.collapsed {
            for line in text.lines().take(LYRICS_PREVIEW_LINES) {
                writeln!(out, "  {}", line)?;
            }
            writeln!(out, "  [More]")?;
        } else {
            for line in text.lines() {
                writeln!(out, "  {}", line)?;
            }
            if s.lyrics.toggle_visible {
                writeln!(out, "  [Less]")?;
            }
        }
        if let Some(link) = &s.lyrics.external_link {
            writeln!(out, "  {}", link)?;
        }
    }

    writeln!(out, "── Stats")?;
    match &s.stats.empty_message {
        Some(msg) => writeln!(out, "  {}", msg)?,
        None => {
            for which in [StatsList::Songs, StatsList::Artists, StatsList::Albums] {
                let list = match which {
                    StatsList::Songs => &s.stats.songs,
                    StatsList::Artists => &s.stats.artists,
                    StatsList::Albums => &s.stats.albums,
                };
                write_ranked(out, which, list)?;
            }
        }
    }

    if !s.likes.status_text.is_empty() {
        writeln!(out, "── Liked GIFs: {}", s.likes.status_text)?;
        for gif in &s.likes.gifs {
            writeln!(out, "  {}  {}", gif.file_id, gif.label())?;
        }
    }

    let settings = &s.settings;
    if !settings.status_text.is_empty() || !settings.gallery_status.is_empty() {
        writeln!(out, "── Settings")?;
        if !settings.status_text.is_empty() {
            writeln!(out, "  {}", settings.status_text)?;
        }
        if !settings.gallery_status.is_empty() {
            writeln!(out, "  gallery: {}", settings.gallery_status)?;
        }
        for image in &settings.gallery {
            let mark = if image.is_current { "*" } else { " " };
            writeln!(out, "  {} {}", mark, image.filename)?;
        }
    }
    Ok(())
}

const LYRICS_PREVIEW_LINES: usize = 8;

fn write_ranked(
    out: &mut String,
    which: StatsList,
    list: &ExpandableCollection<RankedListItem>,
) -> std::fmt::Result {
    let title = match which {
        StatsList::Songs => "Top songs",
        StatsList::Artists => "Top artists",
        StatsList::Albums => "Top albums",
    };
    writeln!(out, "  {}", title)?;
    let view = list.view();
    for item in view.rows {
        match &item.sublabel {
            Some(sub) => writeln!(out, "   {:>2}. {} – {} ({})", item.rank, item.label, sub, item.count_text())?,
            None => writeln!(out, "   {:>2}. {} ({})", item.rank, item.label, item.count_text())?,
        }
    }
    if let Some(toggle) = view.toggle {
        writeln!(out, "   [{}]", toggle.label())?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intent::Provisional;

    #[test]
    fn test_render_sections() {
        let mut s = DashboardState::new(5, "/logo.png");
        s.now_playing.title = "No data".to_string();
        s.recognizer.toggle_on = true;
        s.recognizer.status_text = "Running".to_string();
        s.device.status_text = "Connected to Pixoo".to_string();
        s.device.brightness = Provisional::Confirmed(40);
        s.device.brightness.guess(80);
        s.stats.songs.replace(
            (1..=8)
                .map(|i| RankedListItem {
                    rank: i,
                    label: format!("Song {}", i),
                    sublabel: Some("Can".to_string()),
                    count: 9 - i as u64,
                })
                .collect(),
        );

        let text = render(&s);
        assert!(text.contains("  No data\n"));
        assert!(text.contains("cover: /logo.png"));
        assert!(text.contains("Recognizer [on] Running"));
        assert!(text.contains("brightness 80% *"));
        assert!(text.contains("channel -"));
        assert!(text.contains(" 5. Song 5 – Can (4 plays)"));
        assert!(!text.contains("Song 6"));
        assert!(text.contains("[More]"));
    }

    #[test]
    fn test_render_empty_stats_message() {
        let mut s = DashboardState::new(5, "/logo.png");
        s.stats.empty_message = Some("No data yet, play a record!".to_string());
        s.visibility = Visibility::Hidden;
        let text = render(&s);
        assert!(text.starts_with("(hidden"));
        assert!(text.contains("No data yet, play a record!"));
        assert!(!text.contains("Top songs"));
    }
}
