//! Occupancy grid and rover pose decoding
//!
//! The rover reports its map as a single serial line:
//!
//! ```text
//! RECV_ROVER_<ignored>,M,<row_bottom>,...,<row_top>
//! ```
//!
//! Each row is a digit string: `0` empty, `1` obstacle, and `2`/`3`/`4`/`5`
//! the rover facing N/E/W/S. Rows arrive bottom first.

use serde::Serialize;

use crate::command::{Command, CommandSink};

pub const GRID_SIZE: usize = 10;

pub const MATRIX_PREFIX: &str = "RECV_ROVER_";
const MATRIX_MARKER: &str = ",M,";
const MATRIX_TOKEN: &str = "M";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Direction {
    N,
    E,
    S,
    W,
}

impl Direction {
    /// Rover digit to heading
    pub fn from_digit(c: char) -> Option<Self> {
        match c {
            '2' => Some(Direction::N),
            '3' => Some(Direction::E),
            '4' => Some(Direction::W),
            '5' => Some(Direction::S),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RoverPose {
    pub row: usize,
    pub col: usize,
    pub direction: Direction,
}

impl RoverPose {
    /// Bottom-left cell, facing north
    pub const INITIAL: RoverPose = RoverPose {
        row: GRID_SIZE - 1,
        col: 0,
        direction: Direction::N,
    };

    /// Position relative to the starting cell, x to the right and y up
    pub fn display_coords(&self) -> (i32, i32) {
        let origin = Self::INITIAL;
        (
            self.col as i32 - origin.col as i32,
            origin.row as i32 - self.row as i32,
        )
    }
}

impl Default for RoverPose {
    fn default() -> Self {
        Self::INITIAL
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Cell {
    pub visited: bool,
    pub obstacle: bool,
}

/// Fixed 10x10 grid, indexed `[row][col]` with row 0 at the top
pub type Grid = [[Cell; GRID_SIZE]; GRID_SIZE];

pub fn empty_grid() -> Grid {
    [[Cell::default(); GRID_SIZE]; GRID_SIZE]
}

/// Result of decoding one matrix line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatrixUpdate {
    pub grid: Grid,
    /// `None` when the line carries no rover digit
    pub pose: Option<RoverPose>,
}

/// Cheap check for the matrix line shape
pub fn is_matrix_line(text: &str) -> bool {
    text.starts_with(MATRIX_PREFIX) && text.contains(MATRIX_MARKER)
}

/// Decode a matrix line into a grid and optional pose.
///
/// Returns `None` for anything that is not a matrix line or has no row data,
/// so callers keep their current map.
pub fn decode_matrix_line(text: &str) -> Option<MatrixUpdate> {
    if !is_matrix_line(text) {
        return None;
    }

    let tokens: Vec<&str> = text.split(',').collect();
    let m_index = tokens.iter().position(|t| t.trim() == MATRIX_TOKEN)?;
    let rows: Vec<&str> = tokens[m_index + 1..]
        .iter()
        .take(GRID_SIZE)
        .map(|t| t.trim())
        .collect();
    if rows.iter().all(|r| r.is_empty()) {
        return None;
    }

    let num_rows = rows.len();
    let mut grid = empty_grid();

    // Storage order is bottom row first; the last rover digit scanned wins.
    let pose = rows
        .iter()
        .enumerate()
        .fold(None, |pose, (storage_idx, row_str)| {
            let v = num_rows - 1 - storage_idx;
            row_str
                .chars()
                .take(GRID_SIZE)
                .enumerate()
                .fold(pose, |pose, (col, c)| {
                    if c == '1' {
                        grid[v][col].obstacle = true;
                        return pose;
                    }
                    match Direction::from_digit(c) {
                        Some(direction) => Some(RoverPose { row: v, col, direction }),
                        None => pose,
                    }
                })
        });

    Some(MatrixUpdate { grid, pose })
}

/// Grid and pose as held by the monitor between matrix lines
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoverMap {
    grid: Grid,
    pose: RoverPose,
}

impl RoverMap {
    pub fn new() -> Self {
        let mut map = Self {
            grid: empty_grid(),
            pose: RoverPose::INITIAL,
        };
        map.mark_visited();
        map
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn pose(&self) -> RoverPose {
        self.pose
    }

    /// Replace the obstacle layer and move the rover if the update carries a
    /// pose. Visited marks survive until reset.
    pub fn apply(&mut self, update: &MatrixUpdate) {
        for (row, cells) in self.grid.iter_mut().enumerate() {
            for (col, cell) in cells.iter_mut().enumerate() {
                cell.obstacle = update.grid[row][col].obstacle;
            }
        }
        if let Some(pose) = update.pose {
            self.pose = pose;
        }
        self.mark_visited();
    }

    /// Decode and apply a line. Returns whether the map changed.
    pub fn apply_line(&mut self, text: &str) -> bool {
        match decode_matrix_line(text) {
            Some(update) => {
                self.apply(&update);
                true
            }
            None => false,
        }
    }

    /// Restore the initial map without telling the rover
    pub fn clear(&mut self) {
        *self = Self::new();
    }

    /// Restore the initial map and ask the rover to clear its own.
    ///
    /// The command is fire-and-forget; local state is reset regardless.
    pub fn reset(&mut self, sink: &dyn CommandSink) {
        self.clear();
        sink.send(Command::ClearMap);
    }

    fn mark_visited(&mut self) {
        let RoverPose { row, col, .. } = self.pose;
        self.grid[row][col].visited = true;
    }
}

impl Default for RoverMap {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    const BLANK: &str = "0000000000";

    #[derive(Default)]
    struct RecordingSink(RefCell<Vec<Command>>);

    impl CommandSink for RecordingSink {
        fn send(&self, command: Command) {
            self.0.borrow_mut().push(command);
        }
    }

    fn line(rows: &[&str]) -> String {
        format!("RECV_ROVER_x,M,{}", rows.join(","))
    }

    #[test]
    fn test_two_row_line_puts_pose_on_top_row() {
        let update = decode_matrix_line("RECV_ROVER_x,M,0000000000,0002000000").unwrap();
        assert_eq!(
            update.pose,
            Some(RoverPose { row: 0, col: 3, direction: Direction::N })
        );
    }

    #[test]
    fn test_short_input_pads_bottom_rows() {
        for n in 1..=GRID_SIZE {
            let rows = vec!["1111111111"; n];
            let update = decode_matrix_line(&line(&rows)).unwrap();
            let populated = update
                .grid
                .iter()
                .filter(|r| r.iter().all(|c| c.obstacle))
                .count();
            let empty = update
                .grid
                .iter()
                .filter(|r| r.iter().all(|c| !c.obstacle))
                .count();
            assert_eq!(populated, n);
            assert_eq!(empty, GRID_SIZE - n);
            assert!(update.grid[..n].iter().all(|r| r[0].obstacle));
        }
    }

    #[test]
    fn test_excess_rows_are_ignored() {
        let mut rows = vec![BLANK; GRID_SIZE];
        rows.push("1111111111");
        let update = decode_matrix_line(&line(&rows)).unwrap();
        assert!(update.grid.iter().flatten().all(|c| !c.obstacle));
    }

    #[test]
    fn test_bottom_token_maps_to_bottom_row() {
        let mut rows = vec![BLANK; GRID_SIZE];
        rows[0] = "1000000000";
        rows[9] = "0000000001";
        let update = decode_matrix_line(&line(&rows)).unwrap();
        assert!(update.grid[9][0].obstacle);
        assert!(update.grid[0][9].obstacle);
        assert_eq!(update.pose, None);
    }

    #[test]
    fn test_direction_digits() {
        let cases = [('2', Direction::N), ('3', Direction::E), ('4', Direction::W), ('5', Direction::S)];
        for (digit, dir) in cases {
            let row = format!("0{}00000000", digit);
            let update = decode_matrix_line(&line(&[row.as_str()])).unwrap();
            assert_eq!(update.pose, Some(RoverPose { row: 0, col: 1, direction: dir }));
            assert!(!update.grid[0][1].obstacle);
        }
    }

    #[test]
    fn test_last_rover_digit_wins() {
        // Token 0 is scanned first (bottom row), token 1 last (top row)
        let update = decode_matrix_line(&line(&["2000000003", "0500000000"])).unwrap();
        assert_eq!(update.pose, Some(RoverPose { row: 0, col: 1, direction: Direction::S }));

        let update = decode_matrix_line(&line(&["2000000003"])).unwrap();
        assert_eq!(update.pose, Some(RoverPose { row: 0, col: 9, direction: Direction::E }));
    }

    #[test]
    fn test_decode_is_idempotent() {
        let text = line(&["0010000000", "0002000100"]);
        assert_eq!(decode_matrix_line(&text), decode_matrix_line(&text));
    }

    #[test]
    fn test_non_matrix_lines_are_rejected() {
        assert!(decode_matrix_line("hello").is_none());
        assert!(decode_matrix_line("RECV_ROVER_x,1,2,3").is_none());
        assert!(decode_matrix_line("X_RECV_ROVER_,M,0000000000").is_none());
        assert!(decode_matrix_line("RECV_ROVER_x,M,").is_none());
        assert!(decode_matrix_line("RECV_ROVER_x,M, ,").is_none());
    }

    #[test]
    fn test_map_keeps_pose_when_line_has_no_rover() {
        let mut map = RoverMap::new();
        assert!(map.apply_line(&line(&["0003000000"])));
        let pose = map.pose();
        assert_eq!(pose, RoverPose { row: 0, col: 3, direction: Direction::E });

        assert!(map.apply_line(&line(&["1111111111"])));
        assert_eq!(map.pose(), pose);
        assert!(map.grid()[0][0].obstacle);

        assert!(!map.apply_line("RECV_ROVER_no_matrix"));
        assert_eq!(map.pose(), pose);
    }

    #[test]
    fn test_visited_marks_accumulate() {
        let mut map = RoverMap::new();
        assert!(map.grid()[9][0].visited);
        map.apply_line(&line(&["0200000000"]));
        assert!(map.grid()[0][1].visited);
        assert!(map.grid()[9][0].visited);
    }

    #[test]
    fn test_reset_restores_initial_state_and_sends_clear() {
        let sink = RecordingSink::default();
        let mut map = RoverMap::new();
        map.apply_line(&line(&["1111111111", "0000050000"]));
        map.reset(&sink);

        assert_eq!(map, RoverMap::new());
        assert_eq!(map.pose(), RoverPose::INITIAL);
        assert_eq!(sink.0.borrow().as_slice(), &[Command::ClearMap]);
    }

    #[test]
    fn test_display_coords() {
        assert_eq!(RoverPose::INITIAL.display_coords(), (0, 0));
        let pose = RoverPose { row: 0, col: 3, direction: Direction::N };
        assert_eq!(pose.display_coords(), (3, 9));
    }
}
