use std::collections::VecDeque;
use std::fmt::Write;

use bytes::Bytes;
use parking_lot::RwLock;
use tokio::time::Instant;

/// One `moof`+`mdat` media fragment
#[derive(Debug, Clone)]
pub struct Fragment {
    /// Starts at 0 for every transcoder run
    pub sequence: u64,
    pub data: Bytes,
    /// Seconds since the previous fragment (or the initialization segment)
    pub duration: f64,
    /// Wall-clock time of arrival, milliseconds since the Unix epoch
    pub timestamp: i64,
    pub keyframe: bool,
}

#[derive(Default)]
struct StoreState {
    initialization: Option<Bytes>,
    fragments: VecDeque<Fragment>,
    next_sequence: u64,
    last_mark: Option<Instant>,
}

/// Bounded ring of recent fragments for one device, plus its HLS playlist.
pub struct FragmentStore {
    /// Base name of the files in the playlist
    base: String,
    playlist_size: usize,
    capacity: usize,
    state: RwLock<StoreState>,
}

impl FragmentStore {
    /// `playlist_size` fragments are listed, `playlist_size + extra` are retained.
    #[must_use]
    pub fn new(base: impl Into<String>, playlist_size: usize, extra: usize) -> Self {
        let playlist_size = playlist_size.max(1);
        Self {
            base: base.into(),
            playlist_size,
            capacity: playlist_size + extra,
            state: RwLock::new(StoreState::default()),
        }
    }

    /// Forget everything; the next fragment gets sequence 0.
    pub fn reset(&self) {
        *self.state.write() = StoreState::default();
    }

    pub fn set_initialization(&self, segment: Bytes) {
        let mut state = self.state.write();
        state.initialization = Some(segment);
        state.last_mark = Some(Instant::now());
    }

    /// Append a fragment, evicting the oldest once the ring is full.
    pub fn push_fragment(&self, data: Bytes, keyframe: bool) -> Fragment {
        let now = Instant::now();
        let mut state = self.state.write();

        let duration = state
            .last_mark
            .map_or(0.0, |mark| now.duration_since(mark).as_secs_f64());
        let fragment = Fragment {
            sequence: state.next_sequence,
            data,
            duration,
            timestamp: chrono::Utc::now().timestamp_millis(),
            keyframe,
        };

        state.next_sequence += 1;
        state.last_mark = Some(now);
        state.fragments.push_back(fragment.clone());
        while state.fragments.len() > self.capacity {
            state.fragments.pop_front();
        }
        fragment
    }

    /// Initialization segment, once the first fragment of the run exists
    #[must_use]
    pub fn initialization_segment(&self) -> Option<Bytes> {
        let state = self.state.read();
        if state.fragments.is_empty() {
            return None;
        }
        state.initialization.clone()
    }

    #[must_use]
    pub fn fragment(&self, sequence: u64) -> Option<Fragment> {
        let state = self.state.read();
        let first = state.fragments.front()?.sequence;
        let index = usize::try_from(sequence.checked_sub(first)?).ok()?;
        state.fragments.get(index).cloned()
    }

    #[must_use]
    pub fn last_sequence(&self) -> Option<u64> {
        self.state.read().fragments.back().map(|f| f.sequence)
    }

    #[must_use]
    pub fn playlist(&self) -> Option<String> {
        self.playlist_with(str::to_string)
    }

    /// HLS (fMP4) playlist of the newest fragments
    ///
    /// `gen_url` maps each file name (`init-{base}.mp4`, `{base}{seq}.m4s`) to
    /// the URI written into the playlist.
    pub fn playlist_with<F>(&self, mut gen_url: F) -> Option<String>
    where
        F: FnMut(&str) -> String,
    {
        let state = self.state.read();
        if state.fragments.is_empty() || state.initialization.is_none() {
            return None;
        }

        let skip = state.fragments.len().saturating_sub(self.playlist_size);
        let listed: Vec<&Fragment> = state.fragments.iter().skip(skip).collect();

        let target_duration = listed
            .iter()
            .map(|f| f.duration.ceil() as u64)
            .max()
            .unwrap_or(1)
            .max(1);
        let first_sequence = listed.first().map_or(0, |f| f.sequence);

        let mut m3u8 = String::new();
        m3u8.push_str("#EXTM3U\n");
        m3u8.push_str("#EXT-X-VERSION:7\n");
        let _ = writeln!(m3u8, "#EXT-X-TARGETDURATION:{target_duration}");
        let _ = writeln!(m3u8, "#EXT-X-MEDIA-SEQUENCE:{first_sequence}");
        let _ = writeln!(
            m3u8,
            "#EXT-X-MAP:URI=\"{}\"",
            gen_url(&format!("init-{}.mp4", self.base))
        );

        for fragment in listed {
            let _ = writeln!(m3u8, "#EXTINF:{:.6},", fragment.duration);
            let _ = writeln!(
                m3u8,
                "{}",
                gen_url(&format!("{}{}.m4s", self.base, fragment.sequence))
            );
        }

        Some(m3u8)
    }
}
