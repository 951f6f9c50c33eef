//! Shared constants for end-to-end tests
//!
//! Bodies and payloads served by the fake upstream server.

/// Length of the body served with a Content-Length header
pub const SIZED_BODY_LEN: usize = 64 * 1024;

/// Chunks streamed without a Content-Length header
pub const CHUNK_COUNT: usize = 8;
pub const CHUNK_LEN: usize = 4096;

/// Delay between chunks of the throttled stream, in milliseconds
pub const SLOW_CHUNK_DELAY_MS: u64 = 60;

/// Track id carried in every song API answer
pub const TRACK_ID: &str = "003aAYrm3GE0Ac";

/// Song API keyword that never resolves
pub const UNKNOWN_SONG: &str = "No Such Song - Nobody";

/// Playlist share link known to the fake playlist service
pub const PLAYLIST_LINK: &str = "https://y.qq.com/n/ryqq/playlist/7364061065";
pub const PLAYLIST_NAME: &str = "Road Trip";

/// Lyrics as the lyrics endpoint sends them, HTML-escaped
pub const ESCAPED_LYRIC: &str = "[ti&#58;Song]&#10;[00&#58;01.00]Hello&#10;[00&#58;03.50]World";
pub const ESCAPED_TRANSLATION: &str = "[00&#58;01.00]Hola&#10;[00&#58;03.50]Mundo";

/// Merged LRC text expected for [`ESCAPED_LYRIC`] and [`ESCAPED_TRANSLATION`]
pub const MERGED_LYRICS: &str =
    "[00:01.00]Hello\n[00:01.00]Hola\n[00:03.50]World\n[00:03.50]Mundo";

/// Maximum time to wait for the server to become ready
pub const SERVER_READY_TIMEOUT_MS: u64 = 5000;
