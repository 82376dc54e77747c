//! JSON catalog import used to seed a puzzle store.

use std::{collections::HashSet, fs, path::Path};

use thiserror::Error;
use tracing::info;
use validator::{Validate, ValidationErrors};

use crate::{
    dao::{
        models::{PuzzleEntity, PuzzleId},
        puzzle_store::PuzzleStore,
        storage::StorageResult,
    },
    dto::catalog::CatalogPuzzle,
    rating::RatingSettings,
};

/// Reasons a catalog file cannot be imported.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to read catalog `{path}`")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse catalog `{path}`")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("catalog puzzle {id} is invalid: {errors}")]
    Invalid { id: PuzzleId, errors: ValidationErrors },
    #[error("catalog puzzle id {0} appears more than once")]
    DuplicateId(PuzzleId),
}

/// Parse and validate a catalog document. The whole document is rejected on the first
/// invalid puzzle.
pub fn parse_catalog(
    contents: &str,
    path: &str,
    settings: &RatingSettings,
) -> Result<Vec<PuzzleEntity>, CatalogError> {
    let rows: Vec<CatalogPuzzle> =
        serde_json::from_str(contents).map_err(|source| CatalogError::Parse {
            path: path.to_owned(),
            source,
        })?;

    let mut seen = HashSet::with_capacity(rows.len());
    rows.into_iter()
        .map(|row| {
            row.validate()
                .map_err(|errors| CatalogError::Invalid { id: row.id, errors })?;
            if !seen.insert(row.id) {
                return Err(CatalogError::DuplicateId(row.id));
            }
            Ok(row.into_entity(settings))
        })
        .collect()
}

/// Read and validate the catalog at `path`.
pub fn read_catalog(
    path: &Path,
    settings: &RatingSettings,
) -> Result<Vec<PuzzleEntity>, CatalogError> {
    let display = path.display().to_string();
    let contents = fs::read_to_string(path).map_err(|source| CatalogError::Read {
        path: display.clone(),
        source,
    })?;
    parse_catalog(&contents, &display, settings)
}

/// Insert the catalog puzzles `store` does not hold yet.
///
/// Puzzles already present keep their rating and solve count, so seeding can run on
/// every connect.
pub async fn seed_store(
    store: &dyn PuzzleStore,
    puzzles: Vec<PuzzleEntity>,
) -> StorageResult<usize> {
    let total = puzzles.len();
    let inserted = store.insert_puzzles(puzzles).await?;
    info!(total, inserted, "catalog seeded");
    Ok(inserted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{dao::puzzle_store::memory::MemoryPuzzleStore, rating::Rating};

    const CATALOG: &str = r#"[
        {
            "id": 1,
            "fen1": "6k1/5ppp/8/8/8/8/5PPP/3R2K1 w - - 0 1",
            "move1": "d1d8",
            "fen2": "3R2k1/5ppp/8/8/8/8/5PPP/6K1 b - - 1 1",
            "move2": "g8h7",
            "solution": false,
            "color": "w",
            "type_id": 2,
            "rating": 1320.0
        },
        {
            "id": 2,
            "fen1": "r1bqkbnr/pppp1ppp/2n5/4p3/4P3/5N2/PPPP1PPP/RNBQKB1R w KQkq - 2 3",
            "move1": "f1b5",
            "fen2": "r1bqkbnr/pppp1ppp/2n5/1B2p3/4P3/5N2/PPPP1PPP/RNBQK2R b KQkq - 3 3",
            "move2": "a7a6",
            "solution": true,
            "color": "w"
        }
    ]"#;

    #[test]
    fn parses_valid_catalog() {
        let puzzles = parse_catalog(CATALOG, "inline", &RatingSettings::default()).unwrap();
        assert_eq!(puzzles.len(), 2);
        assert_eq!(puzzles[0].rating.rating, 1320.0);
        assert_eq!(puzzles[0].type_id, 2);
        assert_eq!(puzzles[1].rating.rating, 1500.0);
    }

    #[test]
    fn rejects_duplicates_and_invalid_rows() {
        let duplicated = CATALOG.replace("\"id\": 2", "\"id\": 1");
        assert!(matches!(
            parse_catalog(&duplicated, "inline", &RatingSettings::default()),
            Err(CatalogError::DuplicateId(1))
        ));

        let mismatched = CATALOG.replacen("\"color\": \"w\"", "\"color\": \"b\"", 1);
        assert!(matches!(
            parse_catalog(&mismatched, "inline", &RatingSettings::default()),
            Err(CatalogError::Invalid { id: 1, .. })
        ));

        assert!(matches!(
            parse_catalog("{}", "inline", &RatingSettings::default()),
            Err(CatalogError::Parse { .. })
        ));
    }

    #[test]
    fn missing_file_is_reported() {
        let err = read_catalog(Path::new("does/not/exist.json"), &RatingSettings::default())
            .unwrap_err();
        assert!(matches!(err, CatalogError::Read { .. }));
    }

    #[tokio::test]
    async fn reseeding_keeps_learned_ratings() {
        let store = MemoryPuzzleStore::new();
        let puzzles = parse_catalog(CATALOG, "inline", &RatingSettings::default()).unwrap();
        assert_eq!(seed_store(&store, puzzles.clone()).await.unwrap(), 2);

        let mut tx = PuzzleStore::begin(&store, "alice").await.unwrap();
        tx.lock_puzzle(1).await.unwrap().unwrap();
        tx.save_puzzle_rating(1, Rating::new(1400.0, 300.0, 0.06), true)
            .await
            .unwrap();
        tx.commit().await.unwrap();

        assert_eq!(seed_store(&store, puzzles).await.unwrap(), 0);
        let kept = PuzzleStore::find_puzzle(&store, 1).await.unwrap().unwrap();
        assert_eq!(kept.rating.rating, 1400.0);
        assert_eq!(kept.solve_count, 1);
    }
}
