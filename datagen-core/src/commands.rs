//! Shell command generation.
//!
//! Turns size categories into `mkdir`/`head` invocations. Nothing is written
//! locally: the commands are executed later, on the target container.
//!
//! ## Layout
//!
//! Every category gets its own tree under the root directory:
//!
//! ```text
//! <root>/<category>/<group>/<leaf>/<file>
//!                   <group>/<group>/<leaf>/<file>
//! ```
//!
//! Each command creates one leaf directory and fills it with at most
//! `max_files_per_dir` files. After `max_files_per_dir` leaves a new group
//! directory is nested below the current one, so the tree grows in depth as
//! well as in width, the way real upload folders do.

use rand::Rng;

use crate::category::SizeCategory;
use crate::distribution::Distribution;
use crate::names::random_name;

/// Source of random bytes on the target container.
const RANDOM_SOURCE: &str = "/dev/urandom";

/// Joins the parts of one chunk command.
const AND: &str = " && ";

/// Builds the shell commands that create one site's synthetic data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandBuilder {
    root_dir: String,
    max_files_per_dir: usize,
}

impl CommandBuilder {
    /// Create a builder writing below `root_dir`.
    ///
    /// Trailing slashes are dropped from `root_dir` and `max_files_per_dir`
    /// is clamped to at least 1.
    pub fn new(root_dir: impl Into<String>, max_files_per_dir: usize) -> Self {
        let root_dir = root_dir.into();
        let trimmed = root_dir.trim_end_matches('/');
        let root_dir = match (trimmed.is_empty(), root_dir.starts_with('/')) {
            (false, _) => trimmed.to_string(),
            (true, true) => "/".to_string(),
            (true, false) => ".".to_string(),
        };

        Self {
            root_dir,
            max_files_per_dir: max_files_per_dir.max(1),
        }
    }

    /// Root directory all generated paths live under.
    pub fn root_dir(&self) -> &str {
        &self.root_dir
    }

    /// Maximum number of files written into one directory.
    pub fn max_files_per_dir(&self) -> usize {
        self.max_files_per_dir
    }

    /// `mkdir -p <root>`.
    pub fn create_root_command(&self) -> String {
        format!("mkdir -p {}", self.root_dir)
    }

    /// Absolute (or root-relative) path of `relative` below the root.
    pub fn path(&self, relative: &str) -> String {
        if self.root_dir == "/" {
            format!("/{relative}")
        } else {
            format!("{}/{relative}", self.root_dir)
        }
    }

    /// One command that creates `relative_dir` and writes up to `num_files`
    /// random files into it.
    ///
    /// Stops adding files as soon as the category reaches its target, so the
    /// last chunk of a category may be short. With `num_files == 0` only the
    /// directory is created.
    pub fn chunk_command<R: Rng + ?Sized>(
        &self,
        category: &mut SizeCategory,
        relative_dir: &str,
        num_files: usize,
        rng: &mut R,
    ) -> String {
        let dir = self.path(relative_dir);
        let mut parts = Vec::with_capacity(num_files + 1);
        parts.push(format!("mkdir -p {dir}"));

        for _ in 0..num_files {
            let size = category.next_file_size(rng);
            let name = random_name(rng);
            parts.push(format!("head -c {size} {RANDOM_SOURCE} > {dir}/{name}"));
            if category.is_done() {
                break;
            }
        }

        parts.join(AND)
    }

    /// Lazily generate the commands for one category.
    ///
    /// The iterator ends once the category has reached its target; a category
    /// with a zero target yields nothing.
    pub fn category_commands<'a, R: Rng + ?Sized>(
        &'a self,
        category: &'a mut SizeCategory,
        rng: &'a mut R,
    ) -> CategoryCommands<'a, R> {
        let base_path = category.name.clone();
        CategoryCommands {
            builder: self,
            category,
            rng,
            base_path,
            emitted: 0,
        }
    }

    /// Generate the commands for every category of a distribution, in
    /// category order.
    pub fn distribution_commands<R: Rng + ?Sized>(
        &self,
        distribution: &mut Distribution,
        rng: &mut R,
    ) -> Vec<String> {
        let mut commands = Vec::new();
        for category in &mut distribution.categories {
            commands.extend(self.category_commands(category, rng));
        }
        commands
    }
}

/// Iterator over the chunk commands of one [`SizeCategory`].
///
/// Created by [`CommandBuilder::category_commands`].
pub struct CategoryCommands<'a, R: ?Sized> {
    builder: &'a CommandBuilder,
    category: &'a mut SizeCategory,
    rng: &'a mut R,
    base_path: String,
    emitted: usize,
}

impl<R: Rng + ?Sized> Iterator for CategoryCommands<'_, R> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        if self.category.is_done() {
            return None;
        }

        let per_dir = self.builder.max_files_per_dir;
        if self.emitted % per_dir == 0 {
            self.base_path.push('/');
            self.base_path.push_str(&random_name(self.rng));
        }

        let leaf = format!("{}/{}", self.base_path, random_name(self.rng));
        self.emitted += 1;

        Some(
            self.builder
                .chunk_command(self.category, &leaf, per_dir, self.rng),
        )
    }
}

/// Result of planning one site's data.
#[derive(Debug, Clone)]
pub struct DataPlan {
    /// The distribution after generation; every category is exhausted.
    pub distribution: Distribution,
    /// Commands in execution order.
    pub commands: Vec<String>,
}

/// Generates the full command set for one application.
///
/// Holds only immutable settings; every call to [`generate`](Self::generate)
/// draws a fresh distribution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupDataGen {
    builder: CommandBuilder,
    profile: String,
}

impl BackupDataGen {
    /// Create a generator for the given profile name.
    pub fn new(builder: CommandBuilder, profile: impl Into<String>) -> Self {
        Self {
            builder,
            profile: profile.into(),
        }
    }

    /// Requested profile name (may be unknown, in which case the default
    /// profile is used).
    pub fn profile(&self) -> &str {
        &self.profile
    }

    /// The underlying command builder.
    pub fn builder(&self) -> &CommandBuilder {
        &self.builder
    }

    /// Build a fresh distribution and all of its commands.
    pub fn plan<R: Rng + ?Sized>(&self, rng: &mut R) -> DataPlan {
        let mut distribution = Distribution::build(&self.profile, rng);
        let commands = self.builder.distribution_commands(&mut distribution, rng);
        DataPlan {
            distribution,
            commands,
        }
    }

    /// Commands only; see [`plan`](Self::plan).
    pub fn generate<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<String> {
        self.plan(rng).commands
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MIB;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::{HashMap, HashSet};

    /// Parsed form of one chunk command.
    struct Chunk {
        dir: String,
        files: Vec<(u64, String)>,
    }

    fn parse_chunk(command: &str) -> Chunk {
        let mut parts = command.split(AND);
        let dir = parts
            .next()
            .and_then(|p| p.strip_prefix("mkdir -p "))
            .expect("chunk starts with mkdir")
            .to_string();

        let files = parts
            .map(|part| {
                let rest = part.strip_prefix("head -c ").expect("file part uses head");
                let (size, rest) = rest.split_once(' ').expect("size");
                let path = rest
                    .strip_prefix("/dev/urandom > ")
                    .expect("reads urandom");
                (size.parse().expect("numeric size"), path.to_string())
            })
            .collect();

        Chunk { dir, files }
    }

    fn parent(path: &str) -> &str {
        path.rsplit_once('/').map(|(p, _)| p).unwrap_or("")
    }

    #[test]
    fn builder_normalizes_root_and_limit() {
        assert_eq!(CommandBuilder::new("/data/", 10).root_dir(), "/data");
        assert_eq!(CommandBuilder::new("/", 10).root_dir(), "/");
        assert_eq!(CommandBuilder::new("", 10).root_dir(), ".");
        assert_eq!(CommandBuilder::new("/data", 0).max_files_per_dir(), 1);
    }

    #[test]
    fn create_root_command_uses_root() {
        let builder = CommandBuilder::new("./wp-content/backup-gen/test", 30);
        assert_eq!(
            builder.create_root_command(),
            "mkdir -p ./wp-content/backup-gen/test"
        );
    }

    #[test]
    fn path_joins_without_double_slash() {
        assert_eq!(CommandBuilder::new("/", 1).path("a/b"), "/a/b");
        assert_eq!(CommandBuilder::new("/var/www", 1).path("a"), "/var/www/a");
    }

    #[test]
    fn chunk_command_writes_requested_files() {
        let builder = CommandBuilder::new("/var/backup", 30);
        let mut category = SizeCategory::new("test", 1_024, 2_048, MIB);
        let mut rng = StdRng::seed_from_u64(1);

        let command = builder.chunk_command(&mut category, "data/images", 5, &mut rng);
        let chunk = parse_chunk(&command);

        assert_eq!(chunk.dir, "/var/backup/data/images");
        assert_eq!(chunk.files.len(), 5);
        for (size, path) in &chunk.files {
            assert!((1_024..=2_048).contains(size));
            assert_eq!(parent(path), chunk.dir);
        }
        let declared: u64 = chunk.files.iter().map(|(size, _)| size).sum();
        assert_eq!(category.generated_bytes(), declared);
    }

    #[test]
    fn chunk_command_with_no_files_only_creates_directory() {
        let builder = CommandBuilder::new("./backup", 30);
        let mut category = SizeCategory::new("test", 1, 2, 100);
        let mut rng = StdRng::seed_from_u64(2);

        let command = builder.chunk_command(&mut category, "empty", 0, &mut rng);
        assert_eq!(command, "mkdir -p ./backup/empty");
        assert_eq!(category.generated_bytes(), 0);
    }

    #[test]
    fn chunk_stops_when_target_reached_mid_chunk() {
        let builder = CommandBuilder::new("/data", 30);
        let mut category = SizeCategory::new("tiny", 100, 100, 250);
        let mut rng = StdRng::seed_from_u64(3);

        let chunk = parse_chunk(&builder.chunk_command(&mut category, "d", 30, &mut rng));
        assert_eq!(chunk.files.len(), 3);
        assert_eq!(category.generated_bytes(), 300);
        assert!(category.is_done());
    }

    #[test]
    fn zero_target_yields_no_commands() {
        let builder = CommandBuilder::new("/data", 30);
        let mut category = SizeCategory::new("empty", 1, 10, 0);
        let mut rng = StdRng::seed_from_u64(4);

        assert_eq!(builder.category_commands(&mut category, &mut rng).count(), 0);
        assert_eq!(category.generated_bytes(), 0);
    }

    #[test]
    fn empty_file_category_terminates() {
        let builder = CommandBuilder::new("/data", 30);
        let mut category = SizeCategory::new("empty-files", 0, 0, 10);
        let mut rng = StdRng::seed_from_u64(4);

        let emitted = builder
            .category_commands(&mut category, &mut rng)
            .take(10_000)
            .count();
        assert_eq!(emitted, 0);
    }

    #[test]
    fn distribution_with_empty_file_category_terminates() {
        let builder = CommandBuilder::new("/data", 30);
        let mut distribution = Distribution {
            profile: "custom",
            total_bytes: 2_000,
            categories: vec![
                SizeCategory::new("empty-files", 0, 0, 1_000),
                SizeCategory::new("small", 10, 20, 1_000),
            ],
        };
        let mut rng = StdRng::seed_from_u64(8);

        let commands = builder.distribution_commands(&mut distribution, &mut rng);
        assert!(!commands.is_empty());
        assert!(commands.iter().all(|c| c.starts_with("mkdir -p /data/small/")));
        assert!(distribution.is_done());
    }

    #[test]
    fn category_sizes_in_range_and_target_met() {
        let builder = CommandBuilder::new("/data", 7);
        let mut category = SizeCategory::new("small", 150, 400, 100_000);
        let mut rng = StdRng::seed_from_u64(5);

        let commands: Vec<String> = builder.category_commands(&mut category, &mut rng).collect();
        assert!(!commands.is_empty());

        let mut declared = 0;
        for command in &commands {
            for (size, _) in parse_chunk(command).files {
                assert!((150..=400).contains(&size), "size {size} out of range");
                declared += size;
            }
        }

        assert_eq!(declared, category.generated_bytes());
        assert!(declared >= 100_000);
        assert!(declared < 100_000 + 400, "overshoot larger than one file");
    }

    #[test]
    fn no_directory_receives_more_than_max_files() {
        let max = 4;
        let builder = CommandBuilder::new("/data", max);
        let mut category = SizeCategory::new("medium", 10, 50, 20_000);
        let mut rng = StdRng::seed_from_u64(6);

        let commands: Vec<String> = builder.category_commands(&mut category, &mut rng).collect();

        let mut files_per_dir: HashMap<String, usize> = HashMap::new();
        let mut leaves_per_group: HashMap<String, usize> = HashMap::new();
        let mut leaves = HashSet::new();

        for command in &commands {
            let chunk = parse_chunk(command);
            assert!(leaves.insert(chunk.dir.clone()), "leaf created twice");
            *leaves_per_group
                .entry(parent(&chunk.dir).to_string())
                .or_default() += 1;
            for (_, path) in chunk.files {
                *files_per_dir.entry(parent(&path).to_string()).or_default() += 1;
            }
        }

        assert!(commands.len() > max * 2, "test should span several groups");
        assert!(files_per_dir.values().all(|&n| n <= max));
        assert!(leaves_per_group.values().all(|&n| n <= max));
    }

    #[test]
    fn new_group_starts_every_max_chunks() {
        let builder = CommandBuilder::new("/data", 2);
        let mut category = SizeCategory::new("large", 1, 1, 10);
        let mut rng = StdRng::seed_from_u64(7);

        let dirs: Vec<String> = builder
            .category_commands(&mut category, &mut rng)
            .map(|c| parse_chunk(&c).dir)
            .collect();

        // 10 one-byte files, 2 per leaf, 2 leaves per group.
        assert_eq!(dirs.len(), 5);
        assert_eq!(parent(&dirs[0]), parent(&dirs[1]));
        assert_ne!(parent(&dirs[1]), parent(&dirs[2]));
        assert!(parent(&dirs[2]).starts_with(parent(&dirs[0])));
        assert!(dirs.iter().all(|d| d.starts_with("/data/large/")));
    }

    #[test]
    fn medium_profile_end_to_end() {
        let generator = BackupDataGen::new(CommandBuilder::new("/data", 30), "medium");
        let mut rng = StdRng::seed_from_u64(2024);

        let plan = generator.plan(&mut rng);
        assert!(plan.distribution.is_done());

        for category in &plan.distribution.categories {
            assert!(category.target_total_bytes > 0);
            assert!(category.generated_bytes() >= category.target_total_bytes);

            let prefix = format!("mkdir -p /data/{}/", category.name);
            let head = format!("/dev/urandom > /data/{}/", category.name);
            assert!(plan.commands.iter().any(|c| c.starts_with(&prefix)));
            assert!(plan
                .commands
                .iter()
                .any(|c| c.contains("head -c ") && c.contains(&head)));
        }
    }

    #[test]
    fn categories_are_emitted_in_profile_order() {
        let generator = BackupDataGen::new(CommandBuilder::new("/data", 30), "large");
        let mut rng = StdRng::seed_from_u64(77);

        let order: Vec<String> = generator
            .generate(&mut rng)
            .iter()
            .map(|c| parse_chunk(c).dir.split('/').nth(2).unwrap_or("").to_string())
            .fold(Vec::new(), |mut acc, name| {
                if acc.last() != Some(&name) {
                    acc.push(name);
                }
                acc
            });

        assert_eq!(order, vec!["large", "medium", "small"]);
    }

    #[test]
    fn same_seed_same_commands() {
        let generator = BackupDataGen::new(CommandBuilder::new("/data", 30), "medium");
        let a = generator.generate(&mut StdRng::seed_from_u64(9));
        let b = generator.generate(&mut StdRng::seed_from_u64(9));
        assert_eq!(a, b);
    }
}
