//! Dataset categories published by JRA-DB
//!
//! Categories form a closed set. Codes coming from configuration are parsed
//! once at load time; codes in a listing document that do not map to a
//! variant are simply not candidates.

use serde::{Deserialize, Serialize};

use crate::error::JradbError;

/// Dataset category code
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Category {
    /// Horse master
    Xhos,
    /// Jockey master
    Jjoc,
    /// Trainer master
    Jtra,
    /// Results outside JRA
    Xhsk,
    /// Owner master
    Xown,
    /// Breeder master
    Xbrd,
    /// Entries table
    Xstb,
    /// Race results per horse
    Xres,
    /// Local (NAR) racing results
    Cres,
    /// Course records
    Xrec,
    /// Special race registrations
    Jtre,
    /// Newly registered horse names
    Umas,
    /// Deregistered horses
    Delu,
    /// Runner name bulletin
    Xsin,
    /// Weekend flash results
    X200,
    /// Next-day runner table
    I204,
}

impl Category {
    /// Every known category
    pub const ALL: [Category; 16] = [
        Category::Xhos,
        Category::Jjoc,
        Category::Jtra,
        Category::Xhsk,
        Category::Xown,
        Category::Xbrd,
        Category::Xstb,
        Category::Xres,
        Category::Cres,
        Category::Xrec,
        Category::Jtre,
        Category::Umas,
        Category::Delu,
        Category::Xsin,
        Category::X200,
        Category::I204,
    ];

    /// Categories synced when no allow-list is configured
    pub const DEFAULT_ENABLED: [Category; 14] = [
        Category::Xhos,
        Category::Jjoc,
        Category::Jtra,
        Category::Xhsk,
        Category::Xown,
        Category::Xbrd,
        Category::Xstb,
        Category::Xres,
        Category::Cres,
        Category::Xrec,
        Category::Jtre,
        Category::Umas,
        Category::Delu,
        Category::Xsin,
    ];

    /// Four-character code used by the provider and as the folder name
    pub fn code(self) -> &'static str {
        match self {
            Category::Xhos => "XHOS",
            Category::Jjoc => "JJOC",
            Category::Jtra => "JTRA",
            Category::Xhsk => "XHSK",
            Category::Xown => "XOWN",
            Category::Xbrd => "XBRD",
            Category::Xstb => "XSTB",
            Category::Xres => "XRES",
            Category::Cres => "CRES",
            Category::Xrec => "XREC",
            Category::Jtre => "JTRE",
            Category::Umas => "UMAS",
            Category::Delu => "DELU",
            Category::Xsin => "XSIN",
            Category::X200 => "X200",
            Category::I204 => "I204",
        }
    }

    /// Archive name the provider publishes for this category
    pub fn expected_filename(self) -> &'static str {
        match self {
            Category::Xhos => "EXjrshos.dat.zip",
            Category::Jjoc => "jrsjoc.dat.lzh",
            Category::Jtra => "jrstra.dat.lzh",
            Category::Xhsk => "EXjrhshsk.dat.zip",
            Category::Xown => "EXjrsown.dat.zip",
            Category::Xbrd => "EXjrsbrd.dat.zip",
            Category::Xstb => "EXjrsstb.dat.zip",
            Category::Xres => "EXjrsres.dat.zip",
            Category::Cres => "chires.dat.lzh",
            Category::Xrec => "EXjrsrec.dat.zip",
            Category::Jtre => "jrstre.dat.lzh",
            Category::Umas => "JracUmas.dat.zip",
            Category::Delu => "JracDelu.dat.zip",
            Category::Xsin => "EXFSINFHEL.zip",
            Category::X200 => "EXR200jkhr.zip",
            Category::I204 => "I204jkhr.sss.lzh",
        }
    }

    /// Look up a provider code; `None` for codes this build does not know
    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.code() == code)
    }
}

impl std::str::FromStr for Category {
    type Err = JradbError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let code = s.trim().to_ascii_uppercase();
        Self::from_code(&code).ok_or_else(|| JradbError::UnknownCategory(s.to_string()))
    }
}

impl TryFrom<String> for Category {
    type Error = JradbError;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Category> for String {
    fn from(value: Category) -> Self {
        value.code().to_string()
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}
