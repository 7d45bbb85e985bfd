use std::path::{Component, Path, PathBuf};

use uuid::Uuid;

/// Suffix appended to an asset directory while new content is staged.
pub const STAGING_SUFFIX: &str = "_temp";

/// The three archive kinds an iteration can carry. Each maps to a fixed
/// sub-directory under the iteration's root and to a multipart field name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssetKind {
    GeoJson,
    Tile3d,
    OrthoPhoto,
}

impl AssetKind {
    pub const ALL: [AssetKind; 3] = [AssetKind::GeoJson, AssetKind::Tile3d, AssetKind::OrthoPhoto];

    pub fn dir_name(self) -> &'static str {
        match self {
            AssetKind::GeoJson => "geojson",
            AssetKind::Tile3d => "tile_3d",
            AssetKind::OrthoPhoto => "ortho_photo",
        }
    }

    /// Multipart field name carrying this kind's archive (same as the
    /// on-disk directory name).
    pub fn form_field(self) -> &'static str {
        self.dir_name()
    }

    pub fn from_form_field(name: &str) -> Option<AssetKind> {
        AssetKind::ALL.into_iter().find(|k| k.form_field() == name)
    }
}

/// Maps iteration coordinates to file-system paths and public URLs.
///
/// Both the upload pipeline and the download handler resolve paths through
/// this type, so the two can never disagree on where an asset lives.
/// Template: `<root>/<company>/<project>/<iteration>/<kind>[_temp]`.
#[derive(Debug, Clone)]
pub struct DirectoryLayout {
    root: PathBuf,
}

impl DirectoryLayout {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Root directory of one iteration, holding all of its asset directories.
    pub fn iteration_dir(&self, company_id: &str, project_id: Uuid, iteration_id: Uuid) -> PathBuf {
        self.root
            .join(company_id)
            .join(project_id.to_string())
            .join(iteration_id.to_string())
    }

    /// Directory for one asset kind; `staging` selects the temp sibling that
    /// holds not-yet-committed content.
    pub fn asset_dir(
        &self,
        company_id: &str,
        project_id: Uuid,
        iteration_id: Uuid,
        kind: AssetKind,
        staging: bool,
    ) -> PathBuf {
        let name = if staging {
            format!("{}{STAGING_SUFFIX}", kind.dir_name())
        } else {
            kind.dir_name().to_string()
        };
        self.iteration_dir(company_id, project_id, iteration_id)
            .join(name)
    }

    /// Public URL under which a committed asset directory is served.
    pub fn asset_url(
        company_id: &str,
        project_id: Uuid,
        iteration_id: Uuid,
        kind: AssetKind,
    ) -> String {
        format!(
            "/{company_id}/{project_id}/{iteration_id}/{}",
            kind.dir_name()
        )
    }

    /// Resolve a requested file underneath an iteration directory.
    ///
    /// Returns `None` when any segment would step outside the layout root
    /// (`..`, absolute components, drive prefixes), so a crafted URL cannot
    /// reach files the layout does not own.
    pub fn resolve_file(
        &self,
        company_id: &str,
        project_id: Uuid,
        iteration_id: &str,
        file: &str,
    ) -> Option<PathBuf> {
        if !is_plain_component(company_id) || !is_plain_component(iteration_id) {
            return None;
        }

        let mut path = self
            .root
            .join(company_id)
            .join(project_id.to_string())
            .join(iteration_id);
        for component in Path::new(file).components() {
            match component {
                Component::Normal(part) => path.push(part),
                _ => return None,
            }
        }
        Some(path)
    }
}

/// A single relative path segment with no separators or traversal.
fn is_plain_component(value: &str) -> bool {
    let mut components = Path::new(value).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}
