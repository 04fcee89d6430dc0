use serde::{Deserialize, Serialize};

/// One item of a search result set, as stored in the records of a content file.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResultItem {
    pub repo: String,
    pub path: String,
    pub name: String,
    #[serde(rename = "type")]
    pub item_type: String,
    pub size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub properties: Vec<Property>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Property {
    pub key: String,
    pub value: String,
}

impl ResultItem {
    /// `repo/name` for items at the repository root (`path == "."`), `repo/path/name` otherwise.
    pub fn relative_path(&self) -> String {
        if self.path == "." {
            format!("{}/{}", self.repo, self.name)
        } else {
            format!("{}/{}/{}", self.repo, self.path, self.name)
        }
    }

    pub fn is_folder(&self) -> bool {
        self.item_type == "folder"
    }
}
