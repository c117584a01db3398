pub mod time;

/// A 股申报单位：买入委托必须是 100 股（一手）的整数倍。
pub const BOARD_LOT: i64 = 100;

/// # Summary
/// 将数量向下取整到一手（100 股）的整数倍。
///
/// # Invariants
/// - 返回值永远是 `BOARD_LOT` 的非负整数倍。
pub fn round_down_to_lot(volume: i64) -> i64 {
    if volume <= 0 {
        return 0;
    }
    (volume / BOARD_LOT) * BOARD_LOT
}
