//! Structured logging macros.
//!
//! Every event carries a `component` field so JSON output can be filtered
//! per component; block events add `block_number` and `block_hash`, round
//! events add `round`.

/// Log an event with a component field.
#[macro_export]
macro_rules! log_event {
    ($level:ident, $component:expr, $msg:expr $(, $($field:tt)*)?) => {
        ::tracing::$level!(
            component = $component,
            $($($field)*,)?
            $msg
        )
    };
}

/// Log a block-related event with standard fields.
#[macro_export]
macro_rules! log_block_event {
    ($level:ident, $component:expr, $msg:expr, $block_number:expr, $block_hash:expr $(, $($field:tt)*)?) => {
        ::tracing::$level!(
            component = $component,
            block_number = $block_number,
            block_hash = %$block_hash,
            $($($field)*,)?
            $msg
        )
    };
}

/// Log a round-related event with standard fields.
#[macro_export]
macro_rules! log_round_event {
    ($level:ident, $component:expr, $msg:expr, $round:expr $(, $($field:tt)*)?) => {
        ::tracing::$level!(
            component = $component,
            round = $round,
            $($($field)*,)?
            $msg
        )
    };
}
