//! Channel post collections.
//!
//! A collection file holds the posts of a single channel as a JSON array,
//! newest first. Ids are unique within the file; nothing here can tell two
//! channels apart, so callers keep one file per channel.

use kb_core::{Post, Result};
use std::collections::HashMap;
use std::path::Path;
use tracing::warn;

use crate::knowledge_base::{read_optional, write_file};

/// Removes repeated ids, keeping the first occurrence.
///
/// A repeated id whose text differs is logged, since it may mean posts of
/// different channels were mixed.
#[must_use]
pub fn dedup_posts(posts: Vec<Post>) -> Vec<Post> {
    let mut first_text: HashMap<u64, usize> = HashMap::new();
    let mut out: Vec<Post> = Vec::with_capacity(posts.len());
    for post in posts {
        match first_text.get(&post.id) {
            Some(&idx) => {
                if out[idx].text != post.text {
                    warn!(id = post.id, "duplicate post id with different text, keeping first");
                }
            }
            None => {
                first_text.insert(post.id, out.len());
                out.push(post);
            }
        }
    }
    out
}

/// Posts of one channel, unique by id, sorted by id descending.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PostCollection {
    posts: Vec<Post>,
}

impl PostCollection {
    /// Builds a collection from posts in any order.
    #[must_use]
    pub fn from_posts(posts: Vec<Post>) -> Self {
        let mut posts = dedup_posts(posts);
        posts.sort_by(|a, b| b.id.cmp(&a.id));
        Self { posts }
    }

    /// Loads a collection; a missing file is empty.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but is not a JSON array of posts.
    pub fn load(path: &Path) -> Result<Self> {
        let Some(content) = read_optional(path)? else {
            return Ok(Self::default());
        };
        let posts: Vec<Post> = serde_json::from_str(&content)?;
        Ok(Self::from_posts(posts))
    }

    /// Writes the collection as pretty JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save(&self, path: &Path) -> Result<()> {
        let mut bytes = serde_json::to_vec_pretty(&self.posts)?;
        bytes.push(b'\n');
        write_file(path, bytes)
    }

    /// Merges freshly fetched posts. A fetched post replaces a stored one
    /// with the same id. Returns the number of new ids.
    pub fn merge(&mut self, fetched: Vec<Post>) -> usize {
        let mut by_id: HashMap<u64, Post> =
            self.posts.drain(..).map(|p| (p.id, p)).collect();
        let mut added = 0;
        for post in dedup_posts(fetched) {
            if by_id.insert(post.id, post).is_none() {
                added += 1;
            }
        }
        let mut posts: Vec<Post> = by_id.into_values().collect();
        posts.sort_by(|a, b| b.id.cmp(&a.id));
        self.posts = posts;
        added
    }

    /// Posts, newest first.
    #[must_use]
    pub fn posts(&self) -> &[Post] {
        &self.posts
    }

    /// Consumes the collection.
    #[must_use]
    pub fn into_posts(self) -> Vec<Post> {
        self.posts
    }

    /// Number of posts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.posts.len()
    }

    /// Returns true if there are no posts.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.posts.is_empty()
    }
}
