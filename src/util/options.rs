use strum_macros::EnumString;

/// Log base 2 of bytes in a megabyte.
pub const LOG_BYTES_IN_MBYTE: usize = 20;

/// The default maximum heap size used for the old-generation budget check.
pub const DEFAULT_MAX_HEAP_BYTES: usize = 256 << LOG_BYTES_IN_MBYTE;

/// The default depth of the accounting history used for moving averages.
pub const DEFAULT_GC_HISTORY: usize = 1;

/// The collection policy to install at start-up. The policy decides, per
/// cycle, whether to run an incremental pass, a complete pass, or both.
#[derive(Copy, Clone, Debug, PartialEq, Eq, EnumString)]
pub enum PolicySelector {
    OnlyIncrementally,
    OnlyCompletely,
    BySpaceAndTime,
}

fn always_valid<T>(_: &T) -> bool {
    true
}

macro_rules! options {
    ($($(#[$outer:meta])* $name:ident: $type:ty [$validator:expr] = $default:expr),*,) => [
        options!($($(#[$outer])* $name: $type [$validator] = $default),*);
    ];
    ($($(#[$outer:meta])* $name:ident: $type:ty [$validator:expr] = $default:expr),*) => [
        /// Options that shape the collection engine, initialized from
        /// `GENGC_*` environment variables (e.g. `GENGC_GC_HISTORY=4`).
        /// They are read once at start-up and never mutated afterwards.
        #[derive(Clone, Debug)]
        pub struct Options {
            $($(#[$outer])* pub $name: $type),*
        }
        impl Options {
            /// Set an option from its string representation. Returns whether
            /// the value parsed and validated.
            pub fn set_from_str(&mut self, s: &str, val: &str) -> bool {
                match s {
                    $(stringify!($name) => if let Ok(ref val) = val.parse::<$type>() {
                        let validate_fn = $validator;
                        let is_valid = validate_fn(val);
                        if is_valid {
                            self.$name = val.clone();
                        } else {
                            eprintln!("Warn: unable to set {}={:?}. Invalid value. Default value will be used.", s, val);
                        }
                        is_valid
                    } else {
                        eprintln!("Warn: unable to set {}={:?}. Cant parse value. Default value will be used.", s, val);
                        false
                    },)*
                    _ => panic!("Invalid Options key: {}", s)
                }
            }
        }
        impl Default for Options {
            fn default() -> Self {
                let mut options = Options {
                    $($name: $default),*
                };

                // Environment variables that start with GENGC_ and match an
                // option name override the default.
                const PREFIX: &str = "GENGC_";
                for (key, val) in std::env::vars() {
                    if let Some(rest_of_key) = key.strip_prefix(PREFIX) {
                        let lowercase: &str = &rest_of_key.to_lowercase();
                        match lowercase {
                            $(stringify!($name) => { options.set_from_str(lowercase, &val); },)*
                            _ => {}
                        }
                    }
                }
                options
            }
        }
    ]
}

options! {
    /// The collection policy to install at start-up.
    policy:               PolicySelector [always_valid] = PolicySelector::BySpaceAndTime,
    /// How much history to maintain about garbage collections.
    gc_history:           usize          [|v: &usize| *v > 0] = DEFAULT_GC_HISTORY,
    /// The old-generation byte budget. A cycle that leaves more than this
    /// many used bytes behind is retried as complete-only, and reported as
    /// out-of-memory if the retry does not help.
    max_heap_bytes:       usize          [|v: &usize| *v > 0] = DEFAULT_MAX_HEAP_BYTES,
    /// Maintain live-object-byte accounting in addition to chunk-byte
    /// accounting. Off by default because object bytes are expensive to
    /// gather.
    detailed_accounting:  bool           [always_valid] = false,
    /// Log a lifetime accounting summary when `GenGC::log_summary` runs.
    print_gc_summary:     bool           [always_valid] = false,
    /// Capacity of the pinned-object registry. Registration is allocation
    /// free; pinning fails once all slots are taken.
    pin_capacity:         usize          [|v: &usize| *v > 0] = 1024,
    /// Initial capacity of the collection-watcher registry. Registration is
    /// allocation free while under capacity.
    watcher_capacity:     usize          [always_valid] = 16,
}

impl Options {
    /// Set an option from a camel-cased key (e.g. `MaxHeapBytes`), the
    /// spelling used by embedders forwarding their own option tables.
    pub fn set_from_camelcase_str(&mut self, s: &str, val: &str) -> bool {
        let mut sr = String::with_capacity(s.len() + 4);
        for c in s.chars() {
            if c.is_uppercase() {
                if !sr.is_empty() {
                    sr.push('_');
                }
                for c in c.to_lowercase() {
                    sr.push(c);
                }
            } else {
                sr.push(c)
            }
        }
        trace!("Trying to process option pair: ({}, {})", sr, val);
        self.set_from_str(sr.as_str(), val)
    }
}
