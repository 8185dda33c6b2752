use std::fmt;

use thiserror::Error;

/// Mark placed by a player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Symbol {
    /// Always moves first after a reset.
    X,
    /// Second player.
    O,
}

impl Symbol {
    /// Fixed order in which empty slots are filled.
    pub const ALL: [Symbol; 2] = [Symbol::X, Symbol::O];

    /// The other symbol.
    pub fn opponent(self) -> Self {
        match self {
            Symbol::X => Symbol::O,
            Symbol::O => Symbol::X,
        }
    }

    /// Lowercase wire/storage spelling.
    pub fn as_str(self) -> &'static str {
        match self {
            Symbol::X => "x",
            Symbol::O => "o",
        }
    }

    /// Parse the lowercase spelling produced by [`Symbol::as_str`].
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "x" | "X" => Some(Symbol::X),
            "o" | "O" => Some(Symbol::O),
            _ => None,
        }
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Board cell in `1..=9`, numbered row by row from the top-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Position(u8);

impl Position {
    /// Validate a raw cell number.
    pub fn new(value: u8) -> Option<Self> {
        (1..=9).contains(&value).then_some(Self(value))
    }

    /// Raw cell number.
    pub fn get(self) -> u8 {
        self.0
    }

    fn index(self) -> usize {
        usize::from(self.0 - 1)
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One entry of the placement log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    /// Cell that was claimed.
    pub position: Position,
    /// Symbol written into the cell.
    pub symbol: Symbol,
}

/// Number of cells on the board.
pub const CELLS: usize = 9;

/// Three cells forming a row, column or diagonal.
pub type Line = [u8; 3];

/// Winning triples in canonical order: rows, columns, then the two diagonals.
pub const WINNING_LINES: [Line; 8] = [
    [1, 2, 3],
    [4, 5, 6],
    [7, 8, 9],
    [1, 4, 7],
    [2, 5, 8],
    [3, 6, 9],
    [1, 5, 9],
    [3, 5, 7],
];

/// How a finished match ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Three in a row.
    Win {
        /// Symbol that completed the line.
        symbol: Symbol,
        /// The first completed line in [`WINNING_LINES`] order.
        line: Line,
    },
    /// All nine cells filled without a line.
    Draw,
}

/// Process-wide match status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchStatus {
    /// Accepting moves from the player holding `turn`.
    Active {
        /// Symbol expected to move next.
        turn: Symbol,
    },
    /// No moves accepted until a reset.
    Ended(Outcome),
}

/// Board kept as an ordered placement log; the grid is its fold.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Board {
    log: Vec<Placement>,
}

impl Board {
    /// Placement log in the order moves were applied.
    pub fn placements(&self) -> &[Placement] {
        &self.log
    }

    /// Symbol occupying `position`, if any.
    pub fn cell(&self, position: Position) -> Option<Symbol> {
        self.log
            .iter()
            .find(|placement| placement.position == position)
            .map(|placement| placement.symbol)
    }

    /// Whether no placement has been made yet.
    pub fn is_empty(&self) -> bool {
        self.log.is_empty()
    }

    /// Whether all nine cells are taken.
    pub fn is_full(&self) -> bool {
        self.log.len() == CELLS
    }

    fn grid(&self) -> [Option<Symbol>; CELLS] {
        let mut grid = [None; CELLS];
        for placement in &self.log {
            if let Some(cell) = grid.get_mut(placement.position.index()) {
                *cell = Some(placement.symbol);
            }
        }
        grid
    }

    /// Evaluate the folded grid. `None` means the match goes on.
    pub fn outcome(&self) -> Option<Outcome> {
        let grid = self.grid();
        let at = |cell: u8| grid.get(usize::from(cell - 1)).copied().flatten();

        let win = WINNING_LINES.iter().find_map(|line| {
            let [a, b, c] = *line;
            match (at(a), at(b), at(c)) {
                (Some(first), Some(second), Some(third)) if first == second && second == third => {
                    Some(Outcome::Win {
                        symbol: first,
                        line: *line,
                    })
                }
                _ => None,
            }
        });

        win.or_else(|| self.is_full().then_some(Outcome::Draw))
    }

    fn push(&mut self, placement: Placement) {
        self.log.push(placement);
    }
}

/// Rule violation raised by [`MatchMachine::submit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MoveError {
    /// Match already ended.
    #[error("the match is over; reset the board to play again")]
    InvalidState,
    /// The connection does not hold the claimed symbol.
    #[error("symbol `{claimed}` is not assigned to this connection")]
    RoleMismatch {
        /// Symbol the client claimed to play.
        claimed: Symbol,
    },
    /// The claimed symbol is not the one to move.
    #[error("it is `{turn}`'s turn")]
    TurnViolation {
        /// Symbol expected to move.
        turn: Symbol,
    },
    /// The cell already holds a placement.
    #[error("position {0} is already taken")]
    CellOccupied(Position),
}

/// Raised by [`MatchMachine::reset`] when a spectator asks for a reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("only players can reset the board")]
pub struct ResetForbidden;

/// What happened after a placement was accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveResult {
    /// The turn passed to the opponent.
    Continue {
        /// Symbol to move next.
        next_turn: Symbol,
    },
    /// The placement finished the match.
    Ended(Outcome),
}

/// Snapshot read of the match for projections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchSnapshot {
    /// Placement log.
    pub placements: Vec<Placement>,
    /// Current status.
    pub status: MatchStatus,
}

/// Sole writer of the board and match status.
#[derive(Debug, Clone)]
pub struct MatchMachine {
    board: Board,
    status: MatchStatus,
}

impl Default for MatchMachine {
    fn default() -> Self {
        Self {
            board: Board::default(),
            status: MatchStatus::Active { turn: Symbol::X },
        }
    }
}

impl MatchMachine {
    /// Fresh match with X to move.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a match by replaying a stored placement log through the rules.
    ///
    /// Entries that the rules would reject (out-of-turn, duplicate cell, anything
    /// after the match ended) are skipped; the number of skipped entries is returned
    /// alongside the machine.
    pub fn replay(log: impl IntoIterator<Item = Placement>) -> (Self, usize) {
        let mut machine = Self::new();
        let mut skipped = 0;
        for placement in log {
            if machine
                .submit(Some(placement.symbol), placement.position, placement.symbol)
                .is_err()
            {
                skipped += 1;
            }
        }
        (machine, skipped)
    }

    /// Current status.
    pub fn status(&self) -> MatchStatus {
        self.status
    }

    /// Current board.
    pub fn board(&self) -> &Board {
        &self.board
    }

    /// Whether nothing happened since the last reset.
    pub fn is_pristine(&self) -> bool {
        self.board.is_empty() && self.status == MatchStatus::Active { turn: Symbol::X }
    }

    /// Copy the board and status for read-only consumers.
    pub fn snapshot(&self) -> MatchSnapshot {
        MatchSnapshot {
            placements: self.board.placements().to_vec(),
            status: self.status,
        }
    }

    /// Validate and apply a move.
    ///
    /// `assigned` is the symbol the submitting connection currently holds (`None` for
    /// spectators). All checks run before the log is touched.
    pub fn submit(
        &mut self,
        assigned: Option<Symbol>,
        position: Position,
        claimed: Symbol,
    ) -> Result<MoveResult, MoveError> {
        let MatchStatus::Active { turn } = self.status else {
            return Err(MoveError::InvalidState);
        };
        if assigned != Some(claimed) {
            return Err(MoveError::RoleMismatch { claimed });
        }
        if claimed != turn {
            return Err(MoveError::TurnViolation { turn });
        }
        if self.board.cell(position).is_some() {
            return Err(MoveError::CellOccupied(position));
        }

        self.board.push(Placement {
            position,
            symbol: claimed,
        });

        let result = match self.board.outcome() {
            Some(outcome) => {
                self.status = MatchStatus::Ended(outcome);
                MoveResult::Ended(outcome)
            }
            None => {
                let next_turn = turn.opponent();
                self.status = MatchStatus::Active { turn: next_turn };
                MoveResult::Continue { next_turn }
            }
        };

        Ok(result)
    }

    /// Clear the board and hand the first move to X. Spectators may not reset.
    pub fn reset(&mut self, assigned: Option<Symbol>) -> Result<(), ResetForbidden> {
        if assigned.is_none() {
            return Err(ResetForbidden);
        }
        *self = Self::new();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pos(value: u8) -> Position {
        Position::new(value).unwrap()
    }

    fn play(machine: &mut MatchMachine, moves: &[(u8, Symbol)]) -> MoveResult {
        let mut last = None;
        for &(cell, symbol) in moves {
            last = Some(machine.submit(Some(symbol), pos(cell), symbol).unwrap());
        }
        last.expect("at least one move")
    }

    #[test]
    fn initial_state_is_active_with_x_to_move() {
        let machine = MatchMachine::new();
        assert_eq!(machine.status(), MatchStatus::Active { turn: Symbol::X });
        assert!(machine.board().is_empty());
        assert!(machine.is_pristine());
    }

    #[test]
    fn position_rejects_out_of_range_cells() {
        assert!(Position::new(0).is_none());
        assert!(Position::new(10).is_none());
        assert_eq!(Position::new(9).map(Position::get), Some(9));
    }

    #[test]
    fn turns_alternate_until_the_match_ends() {
        let mut machine = MatchMachine::new();
        let mut expected = Symbol::X;
        for cell in [1, 2, 3, 5, 4, 6, 8, 7] {
            assert_eq!(machine.status(), MatchStatus::Active { turn: expected });
            let result = machine.submit(Some(expected), pos(cell), expected).unwrap();
            expected = expected.opponent();
            assert_eq!(result, MoveResult::Continue { next_turn: expected });
        }
    }

    #[test]
    fn top_row_wins_for_x() {
        let mut machine = MatchMachine::new();
        let result = play(
            &mut machine,
            &[
                (1, Symbol::X),
                (4, Symbol::O),
                (2, Symbol::X),
                (5, Symbol::O),
                (3, Symbol::X),
            ],
        );
        let expected = Outcome::Win {
            symbol: Symbol::X,
            line: [1, 2, 3],
        };
        assert_eq!(result, MoveResult::Ended(expected));
        assert_eq!(machine.status(), MatchStatus::Ended(expected));
    }

    #[test]
    fn full_board_without_line_is_a_draw() {
        let mut machine = MatchMachine::new();
        let result = play(
            &mut machine,
            &[
                (1, Symbol::X),
                (2, Symbol::O),
                (3, Symbol::X),
                (5, Symbol::O),
                (4, Symbol::X),
                (6, Symbol::O),
                (8, Symbol::X),
                (7, Symbol::O),
                (9, Symbol::X),
            ],
        );
        assert_eq!(result, MoveResult::Ended(Outcome::Draw));
        assert!(machine.board().is_full());
    }

    #[test]
    fn board_outcome_uses_canonical_line_order() {
        let mut board = Board::default();
        for cell in [1, 2, 3, 4, 7] {
            board.push(Placement {
                position: pos(cell),
                symbol: Symbol::X,
            });
        }
        assert_eq!(
            board.outcome(),
            Some(Outcome::Win {
                symbol: Symbol::X,
                line: [1, 2, 3],
            })
        );
    }

    #[test]
    fn role_mismatch_leaves_board_unchanged() {
        let mut machine = MatchMachine::new();
        let err = machine.submit(Some(Symbol::O), pos(1), Symbol::X).unwrap_err();
        assert_eq!(err, MoveError::RoleMismatch { claimed: Symbol::X });

        let err = machine.submit(None, pos(1), Symbol::X).unwrap_err();
        assert_eq!(err, MoveError::RoleMismatch { claimed: Symbol::X });
        assert!(machine.board().is_empty());
    }

    #[test]
    fn out_of_turn_move_is_a_turn_violation() {
        let mut machine = MatchMachine::new();
        let err = machine.submit(Some(Symbol::O), pos(5), Symbol::O).unwrap_err();
        assert_eq!(err, MoveError::TurnViolation { turn: Symbol::X });
        assert!(machine.board().is_empty());
    }

    #[test]
    fn occupied_cell_is_rejected() {
        let mut machine = MatchMachine::new();
        play(&mut machine, &[(5, Symbol::X)]);
        let err = machine.submit(Some(Symbol::O), pos(5), Symbol::O).unwrap_err();
        assert_eq!(err, MoveError::CellOccupied(pos(5)));
        assert_eq!(machine.board().placements().len(), 1);
        assert_eq!(machine.status(), MatchStatus::Active { turn: Symbol::O });
    }

    #[test]
    fn moves_after_the_end_are_invalid() {
        let mut machine = MatchMachine::new();
        play(
            &mut machine,
            &[
                (1, Symbol::X),
                (4, Symbol::O),
                (2, Symbol::X),
                (5, Symbol::O),
                (3, Symbol::X),
            ],
        );
        let err = machine.submit(Some(Symbol::O), pos(6), Symbol::O).unwrap_err();
        assert_eq!(err, MoveError::InvalidState);
    }

    #[test]
    fn reset_by_player_clears_everything() {
        let mut machine = MatchMachine::new();
        play(&mut machine, &[(1, Symbol::X), (2, Symbol::O)]);
        machine.reset(Some(Symbol::O)).unwrap();
        assert!(machine.is_pristine());
    }

    #[test]
    fn reset_by_spectator_is_forbidden() {
        let mut machine = MatchMachine::new();
        play(&mut machine, &[(1, Symbol::X)]);
        assert_eq!(machine.reset(None), Err(ResetForbidden));
        assert_eq!(machine.board().placements().len(), 1);
    }

    #[test]
    fn replay_skips_entries_the_rules_reject() {
        let log = [
            Placement {
                position: pos(1),
                symbol: Symbol::X,
            },
            Placement {
                position: pos(1),
                symbol: Symbol::O,
            },
            Placement {
                position: pos(2),
                symbol: Symbol::O,
            },
        ];
        let (machine, skipped) = MatchMachine::replay(log);
        assert_eq!(skipped, 1);
        assert_eq!(machine.board().placements().len(), 2);
        assert_eq!(machine.status(), MatchStatus::Active { turn: Symbol::X });
    }
}
