/// Source name constants to ensure consistency across the codebase
/// These are the names used on the CLI, in logs and in metrics labels.
pub const NEPAL_SOURCE: &str = "nepal";
pub const SRILANKA_SOURCE: &str = "srilanka";
pub const JAPAN_SOURCE: &str = "japan";

// Khalti (Nepal) endpoints
pub const KHALTI_MOVIE_LIST_URL: &str = "https://khaltimovies.text2024mail.workers.dev/";
pub const KHALTI_MOVIE_INFO_URL: &str = "https://khalti.com/api/v5/movie-info/{movie_id}";
pub const KHALTI_SHOWINFO_URL: &str = "https://khalti.com/api/v2/service/use/movie/showinfo-v2/";
pub const KHALTI_TOKEN_URL: &str = "https://boxoffice24.pages.dev/Nepal/khaltitoken.txt";
pub const KHALTI_ORIGIN: &str = "https://web.khalti.com";

// BookMyShow (Sri Lanka) endpoints
pub const BMS_MOVIES_URL: &str = "https://lk.bookmyshow.com/pwa/api/uapi/movies/";
pub const BMS_SHOWTIMES_URL: &str = "https://lk.bookmyshow.com/pwa/api/de/showtimes/byevent";
pub const BMS_REFERER: &str = "https://lk.bookmyshow.com/";
pub const BMS_REGION_CODE: &str = "SNLK";

// Box-office blog (Japan)
pub const MIMORIN_BASE_URL: &str = "https://mimorin2014.com";

// Output folders, one per source and mode
pub const NEPAL_DAILY_DIR: &str = "Nepal Boxoffice";
pub const NEPAL_ADVANCE_DIR: &str = "Nepal Advance";
pub const SRILANKA_DAILY_DIR: &str = "Sri Lanka Boxoffice";
pub const SRILANKA_ADVANCE_DIR: &str = "Sri Lanka Advance";
pub const JAPAN_DIR: &str = "Japan_Data/logs";

/// Occupancy at or above this percentage counts as housefull.
pub const HOUSEFULL_PERCENT: f64 = 98.0;
/// Occupancy at or above this percentage (and below housefull) counts as fast-filling.
pub const FAST_FILLING_PERCENT: f64 = 50.0;

/// Both ticketing sources report show times in India Standard Time.
pub const IST_OFFSET_SECS: i32 = 5 * 3600 + 30 * 60;
pub const JST_OFFSET_SECS: i32 = 9 * 3600;

/// Human-readable timestamp stamped into every persisted artifact.
pub const LAST_UPDATED_FORMAT: &str = "%I:%M %p, %d %B %Y";
