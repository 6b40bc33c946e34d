use crate::compiler::ast::{
    Declaration, Expression, Literal, Program, Root, Statement, TopLevelNode, TypeAnnotation,
};
use crate::config::GenerateConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const MANIFEST_FILE: &str = "logic.toml";

/// Project manifest (logic.toml)
#[derive(Debug, Serialize, Deserialize)]
pub struct ProjectManifest {
    pub project: ProjectInfo,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ProjectInfo {
    pub name: String,
    #[serde(default = "default_version")]
    pub version: String,
    /// Logic documents, relative to the manifest.
    #[serde(default = "default_files")]
    pub files: Vec<PathBuf>,
    /// Library directory, relative to the manifest. Bundled libraries when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub libraries: Option<PathBuf>,
}

fn default_version() -> String {
    "0.1.0".to_string()
}

fn default_files() -> Vec<PathBuf> {
    vec![PathBuf::from("logic/main.logic")]
}

impl ProjectManifest {
    /// Create a new project manifest with default values
    pub fn new(name: &str) -> Self {
        Self {
            project: ProjectInfo {
                name: name.to_string(),
                version: default_version(),
                files: default_files(),
                libraries: None,
            },
        }
    }

    /// Load manifest from a directory
    pub fn load(dir: &Path) -> Result<Self, String> {
        let manifest_path = dir.join(MANIFEST_FILE);
        let content = fs::read_to_string(&manifest_path)
            .map_err(|e| format!("failed to read {}: {}", MANIFEST_FILE, e))?;
        toml::from_str(&content).map_err(|e| format!("failed to parse {}: {}", MANIFEST_FILE, e))
    }

    /// Save manifest to a directory
    pub fn save(&self, dir: &Path) -> Result<(), String> {
        let manifest_path = dir.join(MANIFEST_FILE);
        let content = toml::to_string_pretty(self)
            .map_err(|e| format!("failed to serialize {}: {}", MANIFEST_FILE, e))?;
        fs::write(&manifest_path, content)
            .map_err(|e| format!("failed to write {}: {}", MANIFEST_FILE, e))
    }

    /// Pipeline configuration with paths resolved against `dir`.
    pub fn generate_config(&self, dir: &Path) -> GenerateConfig {
        let files = self.project.files.iter().map(|file| dir.join(file)).collect();
        let config = GenerateConfig::new(files);
        match &self.project.libraries {
            Some(libraries) => config.with_libraries_dir(dir.join(libraries)),
            None => config,
        }
    }
}

fn starter_program() -> Program {
    Program::new(vec![Statement::declaration(Declaration::namespace(
        "Colors",
        vec![Declaration::variable(
            "primary",
            Some(TypeAnnotation::named("Color", vec![])),
            Some(Expression::literal(Literal::color("#3366FF"))),
        )],
    ))])
}

/// Initialize a new logic project
pub fn init_project(dir: &Path, name: Option<&str>) -> Result<(), String> {
    // Determine project name
    let project_name = name
        .map(|s| s.to_string())
        .or_else(|| dir.file_name().map(|n| n.to_string_lossy().to_string()))
        .unwrap_or_else(|| "myproject".to_string());

    let manifest_path = dir.join(MANIFEST_FILE);
    if manifest_path.exists() {
        return Err(format!("{} already exists in {}", MANIFEST_FILE, dir.display()));
    }

    let logic_dir = dir.join("logic");
    fs::create_dir_all(&logic_dir)
        .map_err(|e| format!("failed to create logic directory: {}", e))?;

    let manifest = ProjectManifest::new(&project_name);
    manifest.save(dir)?;

    let main_logic = logic_dir.join("main.logic");
    if !main_logic.exists() {
        let document = TopLevelNode::Root(Root::Program(starter_program()));
        let content = serde_json::to_string_pretty(&document)
            .map_err(|e| format!("failed to serialize main.logic: {}", e))?;
        fs::write(&main_logic, content).map_err(|e| format!("failed to write main.logic: {}", e))?;
    }

    println!(
        "Created new logic project '{}' in {}",
        project_name,
        dir.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::decode_program;

    #[test]
    fn test_new_manifest() {
        let manifest = ProjectManifest::new("testproject");
        assert_eq!(manifest.project.name, "testproject");
        assert_eq!(manifest.project.version, "0.1.0");
        assert_eq!(manifest.project.files, vec![PathBuf::from("logic/main.logic")]);
        assert_eq!(manifest.project.libraries, None);
    }

    #[test]
    fn test_manifest_serialization() {
        let manifest = ProjectManifest::new("testproject");
        let toml_str = toml::to_string_pretty(&manifest).unwrap();
        assert!(toml_str.contains("name = \"testproject\""));
        assert!(toml_str.contains("version = \"0.1.0\""));
        assert!(!toml_str.contains("libraries"));
    }

    #[test]
    fn test_manifest_defaults() {
        let manifest: ProjectManifest = toml::from_str(
            r#"
[project]
name = "tokens"
libraries = "vendor/logic"
"#,
        )
        .unwrap();
        assert_eq!(manifest.project.files, default_files());
        let config = manifest.generate_config(Path::new("/work"));
        assert_eq!(config.logic_paths, vec![PathBuf::from("/work/logic/main.logic")]);
        assert_eq!(
            config.library_resolver().directory(),
            Some(Path::new("/work/vendor/logic"))
        );
    }

    #[test]
    fn test_init_project() {
        let temp = tempfile::tempdir().unwrap();

        init_project(temp.path(), Some("mytest")).unwrap();

        assert!(temp.path().join(MANIFEST_FILE).exists());
        let main_logic = temp.path().join("logic/main.logic");
        let source = fs::read_to_string(&main_logic).unwrap();
        let program = decode_program(&main_logic, &source).unwrap();
        assert_eq!(program.block.len(), 1);

        let manifest = ProjectManifest::load(temp.path()).unwrap();
        assert_eq!(manifest.project.name, "mytest");

        assert!(init_project(temp.path(), None).is_err());
    }
}
