use url::Url;

const AUDIO_EXTENSIONS: [&str; 8] = [".mp3", ".wav", ".ogg", ".opus", ".flac", ".m4a", ".webm", ".aac"];

/// Checks whether a link already points at an audio file that needs no resolution.
pub fn is_direct_stream(input: &str) -> bool {
    let Ok(url) = Url::parse(input) else {
        return false;
    };

    if !matches!(url.scheme(), "http" | "https") {
        return false;
    }

    // query strings (signed CDN links) don't count towards the extension
    let path = url.path().to_lowercase();
    AUDIO_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
}

/// Display title for a direct link: the last path segment.
pub fn title_from_url(input: &str) -> String {
    Url::parse(input)
        .ok()
        .and_then(|url| {
            url.path_segments()
                .and_then(|mut segments| segments.next_back().map(str::to_string))
        })
        .filter(|segment| !segment.is_empty())
        .unwrap_or_else(|| input.to_string())
}
