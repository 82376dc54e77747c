//! Validation helpers for DTOs.

use validator::ValidationError;

const MAX_USERNAME_LENGTH: usize = 64;

/// Validates that a username is non-empty, reasonably short and free of whitespace or
/// path separators.
///
/// # Examples
///
/// ```ignore
/// validate_username("magnus_c") // Ok
/// validate_username("")         // Err - empty
/// validate_username("a b")      // Err - whitespace
/// ```
pub fn validate_username(username: &str) -> Result<(), ValidationError> {
    let length = username.chars().count();
    if length == 0 || length > MAX_USERNAME_LENGTH {
        let mut err = ValidationError::new("username_length");
        err.message = Some(
            format!("Username must be between 1 and {MAX_USERNAME_LENGTH} characters (got {length})")
                .into(),
        );
        return Err(err);
    }

    if username
        .chars()
        .any(|c| c.is_whitespace() || c.is_control() || c == '/')
    {
        let mut err = ValidationError::new("username_format");
        err.message = Some("Username must not contain whitespace, control characters or '/'".into());
        return Err(err);
    }

    Ok(())
}

/// Validates the shape of a Forsyth-Edwards Notation string.
///
/// Checks the six fields: 8 ranks of 8 squares, side to move, castling rights,
/// en-passant square and both move counters. Legality of the position is not checked.
pub fn validate_fen(fen: &str) -> Result<(), ValidationError> {
    let fields: Vec<&str> = fen.split_whitespace().collect();
    let [board, side, castling, en_passant, halfmove, fullmove] = fields.as_slice() else {
        return Err(fen_error(format!(
            "FEN must have 6 fields (got {})",
            fields.len()
        )));
    };

    let ranks: Vec<&str> = board.split('/').collect();
    if ranks.len() != 8 {
        return Err(fen_error(format!(
            "FEN board must have 8 ranks (got {})",
            ranks.len()
        )));
    }
    for rank in &ranks {
        let mut squares = 0;
        for c in rank.chars() {
            match c {
                '1'..='8' => squares += c.to_digit(10).unwrap_or_default(),
                'p' | 'n' | 'b' | 'r' | 'q' | 'k' | 'P' | 'N' | 'B' | 'R' | 'Q' | 'K' => {
                    squares += 1
                }
                other => return Err(fen_error(format!("unexpected piece `{other}` in FEN"))),
            }
        }
        if squares != 8 {
            return Err(fen_error(format!(
                "FEN rank `{rank}` covers {squares} squares"
            )));
        }
    }

    if !matches!(*side, "w" | "b") {
        return Err(fen_error(format!("side to move must be `w` or `b` (got `{side}`)")));
    }

    if *castling != "-" && !castling.chars().all(|c| matches!(c, 'K' | 'Q' | 'k' | 'q')) {
        return Err(fen_error(format!("invalid castling rights `{castling}`")));
    }

    let en_passant_ok = *en_passant == "-"
        || matches!(en_passant.as_bytes(), [file, rank] if (b'a'..=b'h').contains(file) && matches!(rank, b'3' | b'6'));
    if !en_passant_ok {
        return Err(fen_error(format!("invalid en-passant square `{en_passant}`")));
    }

    if halfmove.parse::<u32>().is_err() || fullmove.parse::<u32>().map_or(true, |n| n == 0) {
        return Err(fen_error("FEN move counters must be non-negative integers".into()));
    }

    Ok(())
}

fn fen_error(message: String) -> ValidationError {
    let mut err = ValidationError::new("fen_format");
    err.message = Some(message.into());
    err
}
