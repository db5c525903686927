use serde::{Deserialize, Serialize};

/// Variance status of a single grid cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CellStatus {
    Future,
    Empty,
    Equal,
    Over,
    Under,
}

impl CellStatus {
    pub const ALL: [CellStatus; 5] = [
        CellStatus::Future,
        CellStatus::Empty,
        CellStatus::Equal,
        CellStatus::Over,
        CellStatus::Under,
    ];

    /// Classify a cell. Rules apply in order: future, empty, equal, over, under.
    pub fn classify(planned: f64, actual: f64, is_future: bool) -> CellStatus {
        if is_future {
            CellStatus::Future
        } else if actual == 0.0 && planned == 0.0 {
            CellStatus::Empty
        } else if actual == planned {
            CellStatus::Equal
        } else if actual > planned {
            CellStatus::Over
        } else {
            CellStatus::Under
        }
    }

    /// Background color used for this status in every grid view
    pub fn color(self) -> &'static str {
        match self {
            CellStatus::Future => "#E3F2FD",
            CellStatus::Empty => "#F5F5F5",
            CellStatus::Equal => "#FFFFFF",
            CellStatus::Over => "#C8E6C9",
            CellStatus::Under => "#FFCDD2",
        }
    }

    /// One-character marker for plain-text output
    pub fn marker(self) -> char {
        match self {
            CellStatus::Future => '~',
            CellStatus::Empty => ' ',
            CellStatus::Equal => '=',
            CellStatus::Over => '+',
            CellStatus::Under => '-',
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CellStatus::Future => "future",
            CellStatus::Empty => "empty",
            CellStatus::Equal => "equal",
            CellStatus::Over => "over",
            CellStatus::Under => "under",
        }
    }
}

impl std::fmt::Display for CellStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
