use crate::core::snapshot::{depth, is_within, path_key, DirSnapshot, FileSnapshot, TreeSnapshot};
use crate::error::{ItemError, ItemErrorKind, Phase};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// 同步动作
///
/// 所有路径都是相对路径；执行器负责解析成源目录或备份目录下的绝对路径。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Action {
    /// 在备份中创建目录
    CreateDir(String),
    /// 用源文件覆盖备份中内容不同的同名文件
    OverwriteFile(String),
    /// 源目录中内容重复的文件，复制到备份的对应位置
    DuplicateFile { from: String, to: String },
    /// 在备份中创建新文件
    CreateFile(String),
    /// 删除备份中多余的文件
    DeleteFile(String),
    /// 递归删除备份中多余的目录
    DeleteDir(String),
}

impl Action {
    /// 动作所属阶段
    pub fn phase(&self) -> Phase {
        match self {
            Action::CreateDir(_) => Phase::CreateDirs,
            Action::OverwriteFile(_) => Phase::Modify,
            Action::DuplicateFile { .. } => Phase::Duplicate,
            Action::CreateFile(_) => Phase::CreateFiles,
            Action::DeleteFile(_) => Phase::DeleteFiles,
            Action::DeleteDir(_) => Phase::DeleteDirs,
        }
    }

    /// 动作在备份目录中作用的相对路径
    pub fn target(&self) -> &str {
        match self {
            Action::CreateDir(path)
            | Action::OverwriteFile(path)
            | Action::CreateFile(path)
            | Action::DeleteFile(path)
            | Action::DeleteDir(path) => path,
            Action::DuplicateFile { to, .. } => to,
        }
    }

    pub fn is_dir_action(&self) -> bool {
        matches!(self, Action::CreateDir(_) | Action::DeleteDir(_))
    }
}

/// 一轮同步的计划
#[derive(Debug, Default)]
pub struct Plan {
    /// 按阶段顺序排列的动作
    pub actions: Vec<Action>,
    /// 文件与目录同名的冲突，对应的源条目本轮跳过
    pub conflicts: Vec<ItemError>,
    /// 因冲突未创建的目录，其下的动作都无法执行
    pub blocked_dirs: Vec<String>,
}

impl Plan {
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty() && self.conflicts.is_empty()
    }
}

/// 动作统计
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionSummary {
    pub dirs_created: usize,
    pub files_overwritten: usize,
    pub files_duplicated: usize,
    pub files_created: usize,
    pub files_deleted: usize,
    pub dirs_deleted: usize,
}

impl ActionSummary {
    pub fn total(&self) -> usize {
        self.dirs_created
            + self.files_overwritten
            + self.files_duplicated
            + self.files_created
            + self.files_deleted
            + self.dirs_deleted
    }
}

/// 目录树协调器：比较源快照与备份快照，生成有序的动作列表
#[derive(Debug, Default)]
pub struct Reconciler;

impl Reconciler {
    pub fn new() -> Self {
        Self
    }

    /// 比较两棵目录树，返回按阶段排列的同步计划
    ///
    /// 阶段顺序：创建目录 → 覆盖修改 → 复制重复 → 创建文件 → 删除文件 → 删除目录。
    /// 身份由（相对路径，内容 hash）共同决定，不做重命名检测。
    pub fn reconcile(&self, source: &TreeSnapshot, backup: &TreeSnapshot) -> Plan {
        let src_files = index_files(&source.files);
        let bkp_files = index_files(&backup.files);
        let src_dirs = index_dirs(&source.dirs);
        let bkp_dirs = index_dirs(&backup.dirs);
        let bkp_unreadable: BTreeSet<String> =
            backup.unreadable.iter().map(|p| path_key(p)).collect();

        let mut plan = Plan::default();
        // 本轮已安排动作（或因冲突跳过）的源文件
        let mut handled: BTreeSet<&str> = BTreeSet::new();
        let mut conflicting_dirs: BTreeSet<&str> = BTreeSet::new();

        // 文件/目录同名冲突
        for (key, file) in &src_files {
            if bkp_dirs.contains_key(key.as_str()) {
                plan.conflicts.push(ItemError::new(
                    Phase::CreateFiles,
                    file.relative_path.clone(),
                    ItemErrorKind::Conflict("备份中存在同名目录".to_string()),
                ));
                handled.insert(key.as_str());
            }
        }
        for (key, dir) in &src_dirs {
            if bkp_files.contains_key(key.as_str()) || bkp_unreadable.contains(key.as_str()) {
                plan.conflicts.push(ItemError::new(
                    Phase::CreateDirs,
                    dir.relative_path.clone(),
                    ItemErrorKind::Conflict("备份中存在同名文件".to_string()),
                ));
                conflicting_dirs.insert(key.as_str());
                plan.blocked_dirs.push(dir.relative_path.clone());
            }
        }

        // 阶段 1：创建目录（浅层优先，保证父目录先存在）
        let mut created_dirs: Vec<&DirSnapshot> = src_dirs
            .iter()
            .filter(|(key, _)| {
                !bkp_dirs.contains_key(key.as_str()) && !conflicting_dirs.contains(key.as_str())
            })
            .map(|(_, dir)| *dir)
            .collect();
        created_dirs.sort_by(|a, b| {
            depth(&a.relative_path)
                .cmp(&depth(&b.relative_path))
                .then_with(|| a.relative_path.cmp(&b.relative_path))
        });
        plan.actions.extend(
            created_dirs
                .into_iter()
                .map(|d| Action::CreateDir(d.relative_path.clone())),
        );

        // 阶段 2：同路径内容不同 → 覆盖
        for (key, src) in &src_files {
            if handled.contains(key.as_str()) {
                continue;
            }
            let modified = match bkp_files.get(key.as_str()) {
                Some(bkp) => bkp.content_hash != src.content_hash,
                None => bkp_unreadable.contains(key.as_str()),
            };
            if modified {
                plan.actions
                    .push(Action::OverwriteFile(src.relative_path.clone()));
                handled.insert(key.as_str());
            }
        }

        // 阶段 3：源中内容重复的文件（hash → 路径集合）
        let mut groups: BTreeMap<&str, Vec<(&str, &FileSnapshot)>> = BTreeMap::new();
        for (key, src) in &src_files {
            groups
                .entry(src.content_hash.as_str())
                .or_default()
                .push((key.as_str(), *src));
        }

        let mut duplicates = Vec::new();
        for members in groups.values().filter(|m| m.len() > 1) {
            for (key, target) in members {
                if handled.contains(*key) || holds(&bkp_files, key, &target.content_hash) {
                    continue;
                }
                // 优先选已在备份中就位的副本作为来源
                let from = members
                    .iter()
                    .filter(|(k, _)| k != key)
                    .min_by_key(|(k, f)| (!holds(&bkp_files, k, &f.content_hash), *k))
                    .map(|(_, f)| f.relative_path.clone());

                if let Some(from) = from {
                    duplicates.push(Action::DuplicateFile {
                        from,
                        to: target.relative_path.clone(),
                    });
                    handled.insert(*key);
                }
            }
        }
        duplicates.sort_by(|a, b| a.target().cmp(b.target()));
        plan.actions.extend(duplicates);

        // 阶段 4：备份中没有的文件
        for (key, src) in &src_files {
            if handled.contains(key.as_str()) || holds(&bkp_files, key, &src.content_hash) {
                continue;
            }
            plan.actions.push(Action::CreateFile(src.relative_path.clone()));
        }

        // 阶段 5：源中已不存在的文件；源中状态未知的路径保留
        let mut stale_files: Vec<&str> = bkp_files
            .values()
            .map(|f| f.relative_path.as_str())
            .chain(backup.unreadable.iter().map(String::as_str))
            .filter(|rel| {
                let key = path_key(rel);
                !src_files.contains_key(key.as_str()) && !covered(&source.unreadable, &key)
            })
            .collect();
        stale_files.sort();
        stale_files.dedup();
        plan.actions
            .extend(stale_files.into_iter().map(|p| Action::DeleteFile(p.to_string())));

        // 阶段 6：源中已不存在的目录（深层优先）
        let mut stale_dirs: Vec<&DirSnapshot> = bkp_dirs
            .iter()
            .filter(|(key, _)| {
                !src_dirs.contains_key(key.as_str()) && !covered(&source.unreadable, key)
            })
            .map(|(_, dir)| *dir)
            .collect();
        stale_dirs.sort_by(|a, b| {
            depth(&b.relative_path)
                .cmp(&depth(&a.relative_path))
                .then_with(|| b.relative_path.cmp(&a.relative_path))
        });
        plan.actions.extend(
            stale_dirs
                .into_iter()
                .map(|d| Action::DeleteDir(d.relative_path.clone())),
        );

        plan
    }

    /// 统计同步动作
    pub fn summarize_actions<'a>(actions: impl IntoIterator<Item = &'a Action>) -> ActionSummary {
        let mut summary = ActionSummary::default();

        for action in actions {
            match action {
                Action::CreateDir(_) => summary.dirs_created += 1,
                Action::OverwriteFile(_) => summary.files_overwritten += 1,
                Action::DuplicateFile { .. } => summary.files_duplicated += 1,
                Action::CreateFile(_) => summary.files_created += 1,
                Action::DeleteFile(_) => summary.files_deleted += 1,
                Action::DeleteDir(_) => summary.dirs_deleted += 1,
            }
        }

        summary
    }
}

fn index_files(files: &[FileSnapshot]) -> BTreeMap<String, &FileSnapshot> {
    files.iter().map(|f| (path_key(&f.relative_path), f)).collect()
}

fn index_dirs(dirs: &[DirSnapshot]) -> BTreeMap<String, &DirSnapshot> {
    dirs.iter().map(|d| (path_key(&d.relative_path), d)).collect()
}

/// 备份中是否已有（路径，hash）完全一致的文件
fn holds(backup: &BTreeMap<String, &FileSnapshot>, key: &str, hash: &str) -> bool {
    backup.get(key).is_some_and(|f| f.content_hash == hash)
}

/// 路径是否落在源中不可读的条目之内
fn covered(unreadable: &[String], key: &str) -> bool {
    unreadable.iter().any(|u| is_within(key, u))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn file(path: &str, hash: &str) -> FileSnapshot {
        FileSnapshot {
            relative_path: path.to_string(),
            content_hash: hash.to_string(),
            absolute_path: PathBuf::from("/root").join(path),
        }
    }

    fn dir(path: &str) -> DirSnapshot {
        DirSnapshot {
            relative_path: path.to_string(),
            absolute_path: PathBuf::from("/root").join(path),
        }
    }

    fn tree(dirs: &[&str], files: &[(&str, &str)]) -> TreeSnapshot {
        TreeSnapshot {
            root: PathBuf::from("/root"),
            dirs: dirs.iter().map(|d| dir(d)).collect(),
            files: files.iter().map(|(p, h)| file(p, h)).collect(),
            ..Default::default()
        }
    }

    fn plan(source: &TreeSnapshot, backup: &TreeSnapshot) -> Vec<Action> {
        let plan = Reconciler::new().reconcile(source, backup);
        assert!(plan.conflicts.is_empty(), "unexpected conflicts: {:?}", plan.conflicts);
        plan.actions
    }

    #[test]
    fn test_no_changes() {
        let t = tree(&["dir"], &[("a.txt", "h1"), ("dir/b.txt", "h2")]);
        let u = tree(&["dir"], &[("a.txt", "h1"), ("dir/b.txt", "h2")]);
        assert!(Reconciler::new().reconcile(&t, &u).is_empty());
    }

    #[test]
    fn test_empty_backup_with_duplicates() {
        let source = tree(&["dir"], &[("a.txt", "h1"), ("dir/a.txt", "h1")]);
        let backup = tree(&[], &[]);

        assert_eq!(
            plan(&source, &backup),
            vec![
                Action::CreateDir("dir".into()),
                Action::DuplicateFile {
                    from: "dir/a.txt".into(),
                    to: "a.txt".into()
                },
                Action::DuplicateFile {
                    from: "a.txt".into(),
                    to: "dir/a.txt".into()
                },
            ]
        );
    }

    #[test]
    fn test_modified_is_single_overwrite() {
        let source = tree(&[], &[("b.txt", "v2")]);
        let backup = tree(&[], &[("b.txt", "v1")]);
        assert_eq!(
            plan(&source, &backup),
            vec![Action::OverwriteFile("b.txt".into())]
        );
    }

    #[test]
    fn test_backup_only_modified_is_overwritten() {
        let source = tree(&[], &[("b.txt", "v1")]);
        let backup = tree(&[], &[("b.txt", "tampered")]);
        assert_eq!(
            plan(&source, &backup),
            vec![Action::OverwriteFile("b.txt".into())]
        );
    }

    #[test]
    fn test_rename_is_delete_plus_create() {
        let source = tree(&[], &[("new.txt", "h1")]);
        let backup = tree(&[], &[("old.txt", "h1")]);
        assert_eq!(
            plan(&source, &backup),
            vec![
                Action::CreateFile("new.txt".into()),
                Action::DeleteFile("old.txt".into()),
            ]
        );
    }

    #[test]
    fn test_copy_within_source_uses_existing_backup_copy() {
        // a.txt 已同步，之后在源中被复制了两份
        let source = tree(
            &["x"],
            &[("a.txt", "h1"), ("b.txt", "h1"), ("x/c.txt", "h1")],
        );
        let backup = tree(&["x"], &[("a.txt", "h1")]);

        assert_eq!(
            plan(&source, &backup),
            vec![
                Action::DuplicateFile {
                    from: "a.txt".into(),
                    to: "b.txt".into()
                },
                Action::DuplicateFile {
                    from: "a.txt".into(),
                    to: "x/c.txt".into()
                },
            ]
        );
    }

    #[test]
    fn test_modified_duplicate_not_copied_twice() {
        let source = tree(&[], &[("a.txt", "h1"), ("b.txt", "h1")]);
        let backup = tree(&[], &[("a.txt", "h1"), ("b.txt", "h0")]);
        assert_eq!(
            plan(&source, &backup),
            vec![Action::OverwriteFile("b.txt".into())]
        );
    }

    #[test]
    fn test_stale_dir_deleted_after_files_deepest_first() {
        let source = tree(&[], &[]);
        let backup = tree(
            &["stale", "stale/deep", "zeta"],
            &[("stale/old.txt", "h1"), ("stale/deep/x.txt", "h2")],
        );

        assert_eq!(
            plan(&source, &backup),
            vec![
                Action::DeleteFile("stale/deep/x.txt".into()),
                Action::DeleteFile("stale/old.txt".into()),
                Action::DeleteDir("stale/deep".into()),
                Action::DeleteDir("zeta".into()),
                Action::DeleteDir("stale".into()),
            ]
        );
    }

    #[test]
    fn test_create_dirs_shallowest_first() {
        let source = tree(&["a", "a/b", "a/b/c", "z"], &[]);
        let backup = tree(&["a"], &[]);
        assert_eq!(
            plan(&source, &backup),
            vec![
                Action::CreateDir("z".into()),
                Action::CreateDir("a/b".into()),
                Action::CreateDir("a/b/c".into()),
            ]
        );
    }

    #[test]
    fn test_phase_order() {
        let source = tree(
            &["new"],
            &[
                ("changed.txt", "v2"),
                ("new/file.txt", "n1"),
                ("dup1.txt", "d"),
                ("dup2.txt", "d"),
            ],
        );
        let backup = tree(
            &["gone"],
            &[("changed.txt", "v1"), ("dup1.txt", "d"), ("gone/x.txt", "g")],
        );

        let phases: Vec<Phase> = plan(&source, &backup).iter().map(Action::phase).collect();
        assert_eq!(
            phases,
            vec![
                Phase::CreateDirs,
                Phase::Modify,
                Phase::Duplicate,
                Phase::CreateFiles,
                Phase::DeleteFiles,
                Phase::DeleteDirs,
            ]
        );
    }

    #[test]
    fn test_file_dir_conflict_skips_source_file() {
        let source = tree(&[], &[("thing", "h1")]);
        let backup = tree(&["thing"], &[("thing/inner.txt", "h2")]);

        let plan = Reconciler::new().reconcile(&source, &backup);
        assert_eq!(plan.conflicts.len(), 1);
        assert!(plan.conflicts[0].is_conflict());
        assert_eq!(plan.conflicts[0].relative_path, "thing");
        assert_eq!(
            plan.actions,
            vec![
                Action::DeleteFile("thing/inner.txt".into()),
                Action::DeleteDir("thing".into()),
            ]
        );
    }

    #[test]
    fn test_dir_file_conflict_blocks_dir() {
        let source = tree(&["thing"], &[("thing/inner.txt", "h2")]);
        let backup = tree(&[], &[("thing", "h1")]);

        let plan = Reconciler::new().reconcile(&source, &backup);
        assert_eq!(plan.conflicts.len(), 1);
        assert_eq!(plan.blocked_dirs, vec!["thing".to_string()]);
        assert_eq!(
            plan.actions,
            vec![
                Action::CreateFile("thing/inner.txt".into()),
                Action::DeleteFile("thing".into()),
            ]
        );
    }

    #[test]
    fn test_unreadable_source_keeps_backup() {
        let mut source = tree(&["locked"], &[]);
        source.unreadable = vec!["a.txt".into(), "locked".into()];
        let backup = tree(&["locked"], &[("a.txt", "h1"), ("locked/b.txt", "h2")]);

        assert!(Reconciler::new().reconcile(&source, &backup).is_empty());
    }

    #[test]
    fn test_unreadable_backup_file() {
        let source = tree(&[], &[("keep.txt", "h1")]);
        let mut backup = tree(&[], &[]);
        backup.unreadable = vec!["keep.txt".into(), "drop.txt".into()];

        assert_eq!(
            plan(&source, &backup),
            vec![
                Action::OverwriteFile("keep.txt".into()),
                Action::DeleteFile("drop.txt".into()),
            ]
        );
    }

    #[test]
    fn test_summarize_actions() {
        let actions = vec![
            Action::CreateDir("d".into()),
            Action::CreateFile("a".into()),
            Action::CreateFile("b".into()),
            Action::DeleteDir("x".into()),
        ];
        let summary = Reconciler::summarize_actions(&actions);
        assert_eq!(summary.dirs_created, 1);
        assert_eq!(summary.files_created, 2);
        assert_eq!(summary.dirs_deleted, 1);
        assert_eq!(summary.total(), 4);
    }
}
