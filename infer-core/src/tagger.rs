//! # Esquema de Tags BIO e Tipos de Entidade
//!
//! Define o conjunto de tags que o modelo de classificação de tokens prevê.
//!
//! ## Tipos de Entidade
//!
//! | Código | Significado    | Nome de exibição |
//! |--------|----------------|------------------|
//! | PER    | Pessoa         | 人名             |
//! | LOC    | Local          | 地名             |
//! | ORG    | Organização    | 组织             |
//! | JOB    | Cargo/órgão    | 组织             |
//! | PRO    | Produto        | 产品             |
//! | TIME   | Tempo          | 时间             |
//! | COM    | Empresa        | 公司             |
//!
//! ## Tags
//!
//! - `B-TIPO`: primeiro caractere de uma entidade
//! - `I-TIPO`: continuação da mesma entidade
//! - `O`: fora de entidade
//! - `X`: sub-palavra de continuação (sem rótulo próprio)
//! - `[CLS]` / `[SEP]`: posições dos marcadores de início e fim

use serde::{Deserialize, Serialize};

/// Tipos de entidade reconhecidos pelo modelo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityType {
    Per,
    Loc,
    Org,
    Job,
    Pro,
    Time,
    Com,
}

impl EntityType {
    pub const ALL: [EntityType; 7] = [
        EntityType::Per,
        EntityType::Org,
        EntityType::Loc,
        EntityType::Pro,
        EntityType::Job,
        EntityType::Time,
        EntityType::Com,
    ];

    /// Código usado nas tags (ex: "PER")
    pub fn code(&self) -> &'static str {
        match self {
            EntityType::Per => "PER",
            EntityType::Loc => "LOC",
            EntityType::Org => "ORG",
            EntityType::Job => "JOB",
            EntityType::Pro => "PRO",
            EntityType::Time => "TIME",
            EntityType::Com => "COM",
        }
    }

    /// Nome legível da categoria. `ORG` e `JOB` compartilham a mesma categoria.
    pub fn display_name(&self) -> &'static str {
        match self {
            EntityType::Per => "人名",
            EntityType::Loc => "地名",
            EntityType::Org | EntityType::Job => "组织",
            EntityType::Pro => "产品",
            EntityType::Time => "时间",
            EntityType::Com => "公司",
        }
    }

    /// Tenta parsear a partir do código (ex: "LOC" → Some(Loc))
    pub fn from_code(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.code() == s)
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// Tag prevista para uma posição da sequência.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Tag {
    /// **Begin**: início de entidade.
    Begin(EntityType),
    /// **Inside**: continuação de entidade.
    Inside(EntityType),
    /// **Outside**: fora de qualquer entidade.
    Outside,
    /// Sub-palavra de continuação.
    X,
    Cls,
    Sep,
}

impl Tag {
    /// Representação textual (ex: "B-PER", "O", "[CLS]")
    pub fn label(&self) -> String {
        match self {
            Tag::Begin(t) => format!("B-{}", t.code()),
            Tag::Inside(t) => format!("I-{}", t.code()),
            Tag::Outside => "O".to_string(),
            Tag::X => "X".to_string(),
            Tag::Cls => "[CLS]".to_string(),
            Tag::Sep => "[SEP]".to_string(),
        }
    }

    /// Parseia uma tag a partir do rótulo textual.
    pub fn from_label(s: &str) -> Option<Self> {
        match s {
            "O" => return Some(Tag::Outside),
            "X" => return Some(Tag::X),
            "[CLS]" => return Some(Tag::Cls),
            "[SEP]" => return Some(Tag::Sep),
            _ => {}
        }
        let (prefix, code) = s.split_once('-')?;
        let entity_type = EntityType::from_code(code)?;
        match prefix {
            "B" => Some(Tag::Begin(entity_type)),
            "I" => Some(Tag::Inside(entity_type)),
            _ => None,
        }
    }

    /// Tipo da entidade para tags `B-`/`I-`.
    pub fn entity_type(&self) -> Option<EntityType> {
        match self {
            Tag::Begin(t) | Tag::Inside(t) => Some(*t),
            _ => None,
        }
    }
}

impl std::fmt::Display for Tag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Tabela id de classe → tag, na ordem em que o modelo foi treinado.
///
/// O id 0 é reservado para o padding e não corresponde a nenhuma tag; as tags
/// começam em 1. Por isso o modelo tem `len() + 1` classes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagSet {
    tags: Vec<Tag>,
}

impl TagSet {
    pub fn new(tags: Vec<Tag>) -> Self {
        Self { tags }
    }

    /// Conjunto fixo usado pelos modelos NER chineses deste projeto.
    pub fn standard() -> Self {
        use EntityType::*;
        Self::new(vec![
            Tag::Outside,
            Tag::Begin(Per),
            Tag::Inside(Per),
            Tag::Begin(Org),
            Tag::Inside(Org),
            Tag::Begin(Loc),
            Tag::Inside(Loc),
            Tag::Begin(Pro),
            Tag::Inside(Pro),
            Tag::Begin(Job),
            Tag::Inside(Job),
            Tag::Begin(Time),
            Tag::Inside(Time),
            Tag::Begin(Com),
            Tag::Inside(Com),
            Tag::X,
            Tag::Cls,
            Tag::Sep,
        ])
    }

    /// Tag correspondente ao id de classe previsto. `None` para o padding (0)
    /// ou ids fora da tabela.
    pub fn tag(&self, class_id: usize) -> Option<Tag> {
        class_id.checked_sub(1).and_then(|i| self.tags.get(i)).copied()
    }

    pub fn class_id(&self, tag: Tag) -> Option<usize> {
        self.tags.iter().position(|t| *t == tag).map(|i| i + 1)
    }

    /// Número de classes que o modelo deve produzir (tags + padding).
    pub fn num_labels(&self) -> usize {
        self.tags.len() + 1
    }
}

impl Default for TagSet {
    fn default() -> Self {
        Self::standard()
    }
}
