//! Tic-tac-toe rules shared by the local simulation and by tests of
//! server-pushed states.

use crate::models::{Cell, GameState, Mark, Players};

pub const BOARD_SIZE: usize = 9;

/// Rows, then columns, then diagonals. Evaluated in this order.
pub const WINNING_LINES: [[usize; 3]; 8] = [
    [0, 1, 2],
    [3, 4, 5],
    [6, 7, 8],
    [0, 3, 6],
    [1, 4, 7],
    [2, 5, 8],
    [0, 4, 8],
    [2, 4, 6],
];

/// First line fully owned by a single mark.
pub fn find_winning_line(board: &[Cell; BOARD_SIZE]) -> Option<(Mark, [usize; 3])> {
    WINNING_LINES.iter().find_map(|line| {
        let [a, b, c] = *line;
        match board[a] {
            Some(mark) if board[b] == Some(mark) && board[c] == Some(mark) => Some((mark, *line)),
            _ => None,
        }
    })
}

pub fn is_full(board: &[Cell; BOARD_SIZE]) -> bool {
    board.iter().all(Option::is_some)
}

pub fn empty_cells(board: &[Cell; BOARD_SIZE]) -> Vec<usize> {
    board
        .iter()
        .enumerate()
        .filter(|(_, cell)| cell.is_none())
        .map(|(index, _)| index)
        .collect()
}

impl GameState {
    pub fn new(players: Players) -> Self {
        GameState {
            board: [None; BOARD_SIZE],
            current_turn: Mark::X,
            game_over: false,
            winner: None,
            winning_combination: Vec::new(),
            players,
        }
    }

    /// Places the mark whose turn it is. `None` means the move was rejected
    /// and the caller keeps its current state.
    #[must_use]
    pub fn apply_move(&self, index: usize) -> Option<GameState> {
        if self.game_over || index >= BOARD_SIZE || self.board[index].is_some() {
            return None;
        }

        let mut next = self.clone();
        next.board[index] = Some(self.current_turn);

        if let Some((mark, line)) = find_winning_line(&next.board) {
            next.game_over = true;
            next.winner = Some(next.players.label(mark));
            next.winning_combination = line.to_vec();
        } else if is_full(&next.board) {
            next.game_over = true;
            next.winner = None;
            next.winning_combination = Vec::new();
        } else {
            next.current_turn = self.current_turn.opponent();
        }

        Some(next)
    }

    #[must_use]
    pub fn restarted(&self) -> GameState {
        GameState::new(self.players.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seated() -> GameState {
        GameState::new(Players::new(Some("alice".into()), Some("bob".into())))
    }

    fn play(state: GameState, moves: &[usize]) -> GameState {
        moves
            .iter()
            .fold(state, |state, &index| state.apply_move(index).unwrap())
    }

    #[test]
    fn x_completes_top_row() {
        let mut state = seated();
        state.board = [
            Some(Mark::X),
            Some(Mark::X),
            None,
            Some(Mark::O),
            Some(Mark::O),
            None,
            None,
            None,
            None,
        ];
        state.current_turn = Mark::X;

        let next = state.apply_move(2).unwrap();
        assert!(next.game_over);
        assert_eq!(next.winner.as_deref(), Some("alice"));
        assert_eq!(next.winning_combination, vec![0, 1, 2]);
    }

    #[test]
    fn full_board_without_line_is_a_draw() {
        // X O X / X O O / O X X
        let state = play(seated(), &[0, 1, 2, 4, 3, 5, 7, 6, 8]);
        assert!(state.game_over);
        assert!(state.is_draw());
        assert!(state.winning_combination.is_empty());
    }

    #[test]
    fn occupied_cell_and_finished_game_are_rejected() {
        let state = play(seated(), &[4]);
        assert!(state.apply_move(4).is_none());
        assert!(state.apply_move(9).is_none());

        let won = play(seated(), &[0, 3, 1, 4, 2]);
        assert!(won.game_over);
        assert!(won.apply_move(8).is_none());
    }

    #[test]
    fn game_over_tracks_lines_and_full_board() {
        let mut state = seated();
        for index in [4, 0, 8, 2, 1, 7, 6, 3, 5] {
            let before = state.board;
            match state.apply_move(index) {
                Some(next) => {
                    let changed = before
                        .iter()
                        .zip(next.board.iter())
                        .filter(|(a, b)| a != b)
                        .count();
                    assert_eq!(changed, 1);
                    let expected =
                        find_winning_line(&next.board).is_some() || is_full(&next.board);
                    assert_eq!(next.game_over, expected);
                    state = next;
                }
                None => assert!(state.game_over),
            }
        }
    }

    #[test]
    fn first_matching_line_wins() {
        let mut board = [None; BOARD_SIZE];
        for index in [0, 1, 2, 3, 6] {
            board[index] = Some(Mark::X);
        }
        assert_eq!(find_winning_line(&board), Some((Mark::X, [0, 1, 2])));
    }

    #[test]
    fn empty_seat_wins_as_simulated_opponent() {
        let state = GameState::new(Players::new(Some("alice".into()), None));
        let state = play(state, &[0, 3, 1, 4, 8, 5]);
        assert_eq!(state.winner.as_deref(), Some(crate::models::SIMULATED_OPPONENT));
    }

    #[test]
    fn restart_keeps_players() {
        let state = play(seated(), &[0, 1]).restarted();
        assert!(state.is_empty());
        assert_eq!(state.current_turn, Mark::X);
        assert_eq!(state.players.o.as_deref(), Some("bob"));
    }
}
