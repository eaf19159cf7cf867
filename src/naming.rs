//! Display naming for processed files.
//!
//! Names follow `{resolution}_{LANG}[_{title}][_{year}]_{base}.mkv`, e.g.
//! `4K_VIE_Thuyet Minh_2019_Movie.mkv`.

/// Extension given to every renamed or remuxed container.
pub const CONTAINER_EXTENSION: &str = "mkv";

/// Label used when the container exposes no usable video dimensions.
pub const UNKNOWN_RESOLUTION: &str = "unknown_resolution";

/// Longest base name (in characters) kept for extracted subtitle files.
pub const SUBTITLE_BASE_MAX_CHARS: usize = 100;

/// Map video dimensions to a coarse resolution label.
///
/// Either dimension reaching a threshold is enough, so letterboxed sources
/// such as 3840x1608 still count as 4K.
pub fn resolution_label(width: u32, height: u32) -> String {
    let label = if width >= 7680 || height >= 4320 {
        "8K"
    } else if width >= 3840 || height >= 2160 {
        "4K"
    } else if width >= 2560 || height >= 1440 {
        "2K"
    } else if width >= 1920 || height >= 1080 {
        "FHD"
    } else if width >= 1280 || height >= 720 {
        "HD"
    } else if width >= 720 || height >= 480 {
        "480p"
    } else {
        return format!("{}p", width);
    };
    label.to_string()
}

/// Three-letter display abbreviation for a stream language code.
pub fn language_abbreviation(code: &str) -> String {
    let abbr = match code {
        "eng" => "ENG",
        "vie" => "VIE",
        "und" => "UNK",
        "chi" | "zho" => "CHI",
        "jpn" => "JPN",
        "kor" => "KOR",
        "fra" | "fre" => "FRA",
        "deu" | "ger" => "DEU",
        "spa" => "SPA",
        "ita" => "ITA",
        "rus" => "RUS",
        "tha" => "THA",
        "ind" => "IND",
        "msa" | "may" => "MSA",
        "ara" => "ARA",
        "hin" => "HIN",
        "por" => "POR",
        "nld" | "dut" => "NLD",
        "pol" => "POL",
        "tur" => "TUR",
        "swe" => "SWE",
        "nor" => "NOR",
        "dan" => "DAN",
        "fin" => "FIN",
        "ukr" => "UKR",
        "ces" | "cze" => "CES",
        "hun" => "HUN",
        "ron" | "rum" => "RON",
        "bul" => "BUL",
        "hrv" => "HRV",
        "srp" => "SRP",
        "slv" => "SLV",
        "ell" | "gre" => "ELL",
        "heb" => "HEB",
        "kat" | "geo" => "KAT",
        "lat" => "LAT",
        "vie-Nom" => "NOM",
        "cmn" => "CMN",
        "yue" => "YUE",
        "nan" => "NAN",
        "khm" => "KHM",
        "lao" => "LAO",
        "mya" | "bur" => "MYA",
        "ben" => "BEN",
        "tam" => "TAM",
        "tel" => "TEL",
        "mal" => "MAL",
        "kan" => "KAN",
        "mar" => "MAR",
        "pan" => "PAN",
        "guj" => "GUJ",
        "ori" => "ORI",
        "asm" => "ASM",
        "urd" => "URD",
        "fas" | "per" => "FAS",
        "pus" => "PUS",
        "kur" => "KUR",
        "fil" | "tgl" => "FIL",
        "isl" | "ice" => "ISL",
        "est" => "EST",
        "lav" => "LAV",
        "lit" => "LIT",
        "slk" | "slo" => "SLK",
        "cat" => "CAT",
        _ => return code.to_uppercase().chars().take(3).collect(),
    };
    abbr.to_string()
}

/// Replace characters that are illegal in file names (or that ffmpeg chokes on) with `_`.
pub fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect()
}

/// The `{LANG}[_{title}]` token. The title is dropped when empty or equal to
/// the abbreviation, which avoids names like `VIE_VIE`.
pub fn language_token(language_abbr: &str, title: Option<&str>) -> String {
    match title.map(str::trim) {
        Some(title) if !title.is_empty() && title != language_abbr => {
            format!("{}_{}", language_abbr, title)
        }
        _ => language_abbr.to_string(),
    }
}

/// Build the sanitized display file name for a container.
pub fn derive_name(
    resolution_label: &str,
    language_abbr: &str,
    title: Option<&str>,
    year: Option<&str>,
    base_name: &str,
) -> String {
    let mut name = format!("{}_{}", resolution_label, language_token(language_abbr, title));
    if let Some(year) = year.map(str::trim).filter(|y| !y.is_empty()) {
        name.push('_');
        name.push_str(year);
    }
    name.push('_');
    name.push_str(base_name);
    name.push('.');
    name.push_str(CONTAINER_EXTENSION);
    sanitize_filename(&name)
}

/// File name for an extracted subtitle: truncated base name plus the language code.
///
/// `ordinal` distinguishes several same-language tracks from one source; the
/// first track carries no suffix.
pub fn subtitle_name(base_name: &str, language: &str, ordinal: usize) -> String {
    let base: String = base_name.chars().take(SUBTITLE_BASE_MAX_CHARS).collect();
    let name = if ordinal <= 1 {
        format!("{}.{}.srt", base, language)
    } else {
        format!("{}.{}.{}.srt", base, language, ordinal)
    };
    sanitize_filename(&name)
}
