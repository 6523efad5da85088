use std::path::Path;

use crate::channels::ChannelName;
use crate::config::Config;
use crate::native::process::{CommandLine, ExitOutcome, Launcher};
use crate::native::time::Cutoff;
use crate::shutdown::Shutdown;

const POT_PROVIDER_EXTRACTOR_ARGS_PREFIX: &str = "youtubepot-bgutilhttp:base_url=";

/// Builds yt-dlp command lines. Everything but the cutoff and channel is fixed per process.
#[derive(Debug, Clone)]
pub struct Downloader {
    program: String,
    archive_file: String,
    pot_provider_extractor_args: String,
    video_output: String,
    thumbnail_output: String,
    cover_output: String,
    verbose: bool,
}

impl Downloader {
    pub fn new(config: &Config) -> Self {
        let settings = &config.settings;
        let channel_dir = settings.videos_dir.join("%(channel)s");
        let episode = channel_dir
            .join("Season 01")
            .join("%(upload_date>%Y-%m-%d)s %(title)s");
        Self {
            program: settings.downloader.clone(),
            archive_file: path_arg(&settings.archive_file),
            pot_provider_extractor_args: format!(
                "{}{}",
                POT_PROVIDER_EXTRACTOR_ARGS_PREFIX, config.pot_provider_url
            ),
            video_output: format!("{}.%(ext)s", path_arg(&episode)),
            thumbnail_output: format!("thumbnail:{}-thumb.%(ext)s", path_arg(&episode)),
            cover_output: format!("pl_thumbnail:{}", path_arg(&channel_dir.join("cover.jpg"))),
            verbose: settings.verbose,
        }
    }

    /// Full argument vector for one channel. Deterministic in its inputs.
    pub fn command_line(&self, channel: &ChannelName, cutoff: &Cutoff) -> CommandLine {
        let videos_url = channel_videos_url(channel);
        let mut args: Vec<String> = Vec::with_capacity(48);
        let mut push = |items: &[&str]| args.extend(items.iter().map(|s| s.to_string()));

        // Walking back from the newest upload, stop at the first one older than the cutoff.
        push(&["--break-match-filters", cutoff.filter_expr()]);
        // TVs handle jpg thumbnails better than webp.
        push(&["--convert-thumbnails", "jpg"]);
        // Skip the freshest uploads so SponsorBlock has time to fill in.
        push(&["--datebefore", cutoff.date_stamp()]);
        push(&["--download-archive", &self.archive_file]);
        push(&["--embed-metadata", "--embed-subs"]);
        push(&["--extractor-args", "youtube:fetch_pot=always;player_client=mweb"]);
        push(&["--extractor-args", &self.pot_provider_extractor_args]);
        push(&["--extractor-args", "youtubetab:approximate_date"]);
        push(&["--file-access-retries", "0"]);
        push(&["--format-sort", "vcodec:h264,lang,quality,res,fps,hdr:12,acodec:aac"]);
        push(&["--lazy-playlist"]);
        push(&["--max-sleep-interval", "30"]);
        push(&["--merge-output-format", "mp4"]);
        push(&["--no-progress"]);
        push(&["--output", &self.video_output]);
        push(&["--output", &self.thumbnail_output]);
        push(&["--output", &self.cover_output]);
        push(&["--remux-video", "mp4"]);
        push(&["--sleep-interval", "20"]);
        push(&["--sleep-requests", "0.75"]);
        push(&["--sleep-subtitles", "5"]);
        push(&["--sponsorblock-remove", "selfpromo,sponsor"]);
        if self.verbose {
            push(&["--verbose"]);
        }
        push(&["--write-thumbnail"]);
        push(&[&videos_url]);

        CommandLine {
            program: self.program.clone(),
            args,
        }
    }
}

pub fn channel_videos_url(channel: &ChannelName) -> String {
    format!("https://www.youtube.com/@{}/videos", channel)
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Runs the downloader for one channel at a time, never concurrently.
pub struct Supervisor<L> {
    downloader: Downloader,
    launcher: L,
}

impl<L: Launcher> Supervisor<L> {
    pub fn new(downloader: Downloader, launcher: L) -> Self {
        Self { downloader, launcher }
    }

    /// Spawn the downloader for `channel` and wait for it, forwarding shutdown.
    pub async fn run_one(
        &mut self,
        channel: &ChannelName,
        cutoff: &Cutoff,
        shutdown: &Shutdown,
    ) -> anyhow::Result<ExitOutcome> {
        let command = self.downloader.command_line(channel, cutoff);
        tracing::info!(program = %command.program, "Executing yt-dlp for channel {}", channel);
        tracing::debug!(args = ?command.args, "downloader arguments");
        let outcome = self.launcher.launch(&command, shutdown).await?;
        tracing::debug!(channel = %channel, "downloader {}", outcome);
        Ok(outcome)
    }

    #[cfg(test)]
    pub fn launcher(&self) -> &L {
        &self.launcher
    }
}
