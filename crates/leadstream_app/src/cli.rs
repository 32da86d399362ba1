use std::fs;
use std::path::{Path, PathBuf};

use clap::{ArgAction, Parser};
use leadstream_core::{AudioAttachment, GeoPoint, SearchParameters};

/// Kilometres per degree of latitude, close enough for a search box.
const KM_PER_DEGREE: f64 = 111.32;

#[derive(Parser, Debug)]
#[command(version, about = "Stream business leads for an area and category")]
pub struct Cli {
    /// Business category to search for (e.g. "dentist").
    pub category: String,

    /// Display name of the searched place.
    #[arg(long)]
    pub location: String,

    #[arg(long, allow_negative_numbers = true)]
    pub lat: f64,

    #[arg(long, allow_negative_numbers = true)]
    pub lng: f64,

    #[arg(long, default_value_t = 2.0)]
    pub radius_km: f64,

    /// Explicit "south,west,north,east" box; derived from the centre and
    /// radius when omitted.
    #[arg(long)]
    pub bbox: Option<String>,

    /// Free-text refinement sent with the search.
    #[arg(long)]
    pub filter: Option<String>,

    /// Audio note to transcribe and append to the filter.
    #[arg(long)]
    pub audio: Option<PathBuf>,

    /// Merge results into the cached set instead of replacing it.
    #[arg(long)]
    pub merge: bool,

    /// Configuration file (defaults to ./leadstream.ron when present).
    #[arg(long)]
    pub config: Option<PathBuf>,

    #[arg(long)]
    pub backend_url: Option<String>,

    #[arg(long)]
    pub user_id: Option<String>,

    /// Whole-search timeout in seconds.
    #[arg(long)]
    pub timeout_secs: Option<u64>,

    /// Session cache file.
    #[arg(long)]
    pub cache: Option<PathBuf>,

    /// Neither read nor write the session cache.
    #[arg(long)]
    pub no_cache: bool,

    /// Increase verbosity (-v debug, -vv trace).
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    pub fn search_parameters(&self, user_id: &str) -> SearchParameters {
        let center = GeoPoint {
            lat: self.lat,
            lng: self.lng,
        };
        SearchParameters {
            category: self.category.trim().to_string(),
            bbox: self
                .bbox
                .clone()
                .unwrap_or_else(|| bounding_box(center, self.radius_km)),
            center,
            radius_km: self.radius_km,
            location_name: self.location.trim().to_string(),
            filter: self.filter.clone(),
            merge: self.merge,
            user_id: user_id.to_string(),
        }
    }
}

/// Square box around `center` reaching `radius_km` in every direction,
/// formatted as "south,west,north,east".
pub fn bounding_box(center: GeoPoint, radius_km: f64) -> String {
    let lat_delta = radius_km / KM_PER_DEGREE;
    let lng_scale = center.lat.to_radians().cos().abs().max(0.01);
    let lng_delta = radius_km / (KM_PER_DEGREE * lng_scale);
    format!(
        "{:.6},{:.6},{:.6},{:.6}",
        center.lat - lat_delta,
        center.lng - lng_delta,
        center.lat + lat_delta,
        center.lng + lng_delta
    )
}

pub fn read_audio(path: &Path) -> std::io::Result<AudioAttachment> {
    let data = fs::read(path)?;
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "audio".to_string());
    Ok(AudioAttachment {
        file_name,
        mime_type: audio_mime_type(path).to_string(),
        data,
    })
}

fn audio_mime_type(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);
    match extension.as_deref() {
        Some("webm") => "audio/webm",
        Some("wav") => "audio/wav",
        Some("mp3") => "audio/mpeg",
        Some("m4a" | "mp4") => "audio/mp4",
        Some("ogg" | "oga") => "audio/ogg",
        Some("flac") => "audio/flac",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_search_arguments() {
        let cli = Cli::try_parse_from([
            "leadstream",
            "dentist",
            "--location",
            "Lisbon",
            "--lat",
            "38.72",
            "--lng",
            "-9.14",
            "--filter",
            "english speaking",
            "--merge",
            "-vv",
        ])
        .unwrap();

        let parameters = cli.search_parameters("user-3");
        assert_eq!(parameters.category, "dentist");
        assert_eq!(parameters.center, GeoPoint { lat: 38.72, lng: -9.14 });
        assert_eq!(parameters.radius_km, 2.0);
        assert_eq!(parameters.filter.as_deref(), Some("english speaking"));
        assert!(parameters.merge);
        assert_eq!(parameters.user_id, "user-3");
        assert_eq!(cli.verbose, 2);
    }

    #[test]
    fn explicit_bbox_wins() {
        let cli = Cli::try_parse_from([
            "leadstream",
            "cafe",
            "--location",
            "Oslo",
            "--lat",
            "59.91",
            "--lng",
            "10.75",
            "--bbox",
            "1,2,3,4",
        ])
        .unwrap();
        assert_eq!(cli.search_parameters("u").bbox, "1,2,3,4");
    }

    #[test]
    fn derived_box_is_centred() {
        let bbox = bounding_box(GeoPoint { lat: 0.0, lng: 0.0 }, KM_PER_DEGREE);
        assert_eq!(bbox, "-1.000000,-1.000000,1.000000,1.000000");
    }

    #[test]
    fn mime_type_follows_extension() {
        assert_eq!(audio_mime_type(Path::new("note.WEBM")), "audio/webm");
        assert_eq!(audio_mime_type(Path::new("note.m4a")), "audio/mp4");
        assert_eq!(audio_mime_type(Path::new("note")), "application/octet-stream");
    }
}
