use crate::{
    index::{IndexDescriptor, IndexKind, Tokenizer, VectorMetric},
    record::{AccessLevel, FieldAccessModel, FieldKind, FieldModel, FieldValue, RecordKind, RecordRead},
    tuple::{Tuple, TupleElement},
};
use serde::{Deserialize, Serialize};
use serde_bytes::ByteBuf;

fn string_key(id: &str) -> Tuple {
    Tuple::new(vec![TupleElement::String(id.to_string())])
}

///
/// Employee
/// Field-security fixture: salary is restricted to the `hr` role.
///

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct Employee {
    pub id: String,
    pub name: String,
    pub dept: String,
    pub email: String,
    pub salary: i64,
}

impl RecordRead for Employee {
    fn field_value(&self, name: &str) -> FieldValue {
        match name {
            "id" => FieldValue::String(self.id.clone()),
            "name" => FieldValue::String(self.name.clone()),
            "dept" => FieldValue::String(self.dept.clone()),
            "email" => FieldValue::String(self.email.clone()),
            "salary" => FieldValue::Int(self.salary),
            _ => FieldValue::Null,
        }
    }
}

impl RecordKind for Employee {
    const RECORD_NAME: &'static str = "Employee";
    const DIRECTORY: &'static [&'static str] = &["app", "employees"];
    const FIELDS: &'static [FieldModel] = &[
        FieldModel::new("id", FieldKind::Text),
        FieldModel::new("name", FieldKind::Text),
        FieldModel::new("dept", FieldKind::Text),
        FieldModel::new("email", FieldKind::Text),
        FieldModel::new("salary", FieldKind::Int),
    ];
    const INDEXES: &'static [IndexDescriptor] = &[
        IndexDescriptor::new("by_dept", IndexKind::Scalar, &["dept"]),
        IndexDescriptor::new("by_email", IndexKind::Scalar, &["email"]).unique(),
        IndexDescriptor::new("dept_count", IndexKind::Count, &["dept"]),
        IndexDescriptor::new("dept_salary_sum", IndexKind::Sum, &["dept", "salary"]),
        IndexDescriptor::new("dept_salary_min", IndexKind::Min, &["dept", "salary"]),
    ];
    const SECURITY: &'static [FieldAccessModel] = &[FieldAccessModel::new(
        "salary",
        AccessLevel::Roles(&["hr"]),
        AccessLevel::Roles(&["hr"]),
    )];

    fn primary_key(&self) -> Tuple {
        string_key(&self.id)
    }

    fn reset_field(&mut self, name: &str) {
        match name {
            "name" => self.name = String::new(),
            "dept" => self.dept = String::new(),
            "email" => self.email = String::new(),
            "salary" => self.salary = 0,
            _ => {}
        }
    }
}

///
/// Article
/// Dual-write fixture: own directory plus a shared polymorphic mirror.
///

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct Article {
    pub id: String,
    pub title: String,
    pub body: String,
}

impl RecordRead for Article {
    fn field_value(&self, name: &str) -> FieldValue {
        match name {
            "id" => FieldValue::String(self.id.clone()),
            "title" => FieldValue::String(self.title.clone()),
            "body" => FieldValue::String(self.body.clone()),
            _ => FieldValue::Null,
        }
    }
}

impl RecordKind for Article {
    const RECORD_NAME: &'static str = "Article";
    const DIRECTORY: &'static [&'static str] = &["app", "articles"];
    const POLY_DIRECTORY: Option<&'static [&'static str]> = Some(&["app", "documents"]);
    const FIELDS: &'static [FieldModel] = &[
        FieldModel::new("id", FieldKind::Text),
        FieldModel::new("title", FieldKind::Text),
        FieldModel::new("body", FieldKind::Text),
    ];
    const INDEXES: &'static [IndexDescriptor] = &[
        IndexDescriptor::new(
            "article_text",
            IndexKind::FullText {
                tokenizer: Tokenizer::Simple,
            },
            &["title", "body"],
        ),
        IndexDescriptor::new(
            "article_versions",
            IndexKind::Version {
                keep_last_n: Some(3),
            },
            &[],
        ),
    ];

    fn primary_key(&self) -> Tuple {
        string_key(&self.id)
    }

    fn reset_field(&mut self, name: &str) {
        match name {
            "title" => self.title = String::new(),
            "body" => self.body = String::new(),
            _ => {}
        }
    }
}

///
/// Report
/// Lives directly in the shared polymorphic directory (equal paths, so a
/// single write under its type code).
///

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct Report {
    pub id: String,
    pub title: String,
    pub body: String,
}

impl RecordRead for Report {
    fn field_value(&self, name: &str) -> FieldValue {
        match name {
            "id" => FieldValue::String(self.id.clone()),
            "title" => FieldValue::String(self.title.clone()),
            "body" => FieldValue::String(self.body.clone()),
            _ => FieldValue::Null,
        }
    }
}

impl RecordKind for Report {
    const RECORD_NAME: &'static str = "Report";
    const DIRECTORY: &'static [&'static str] = &["app", "documents"];
    const POLY_DIRECTORY: Option<&'static [&'static str]> = Some(&["app", "documents"]);
    const FIELDS: &'static [FieldModel] = &[
        FieldModel::new("id", FieldKind::Text),
        FieldModel::new("title", FieldKind::Text),
        FieldModel::new("body", FieldKind::Text),
    ];
    const INDEXES: &'static [IndexDescriptor] = &[];

    fn primary_key(&self) -> Tuple {
        string_key(&self.id)
    }

    fn reset_field(&mut self, name: &str) {
        match name {
            "title" => self.title = String::new(),
            "body" => self.body = String::new(),
            _ => {}
        }
    }
}

///
/// Edge
/// Graph adjacency fixture.
///

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct Edge {
    pub id: i64,
    pub from: String,
    pub edge: String,
    pub to: String,
}

impl RecordRead for Edge {
    fn field_value(&self, name: &str) -> FieldValue {
        match name {
            "id" => FieldValue::Int(self.id),
            "from" => FieldValue::String(self.from.clone()),
            "edge" => FieldValue::String(self.edge.clone()),
            "to" => FieldValue::String(self.to.clone()),
            _ => FieldValue::Null,
        }
    }
}

impl RecordKind for Edge {
    const RECORD_NAME: &'static str = "Edge";
    const DIRECTORY: &'static [&'static str] = &["app", "social"];
    const FIELDS: &'static [FieldModel] = &[
        FieldModel::new("id", FieldKind::Int),
        FieldModel::new("from", FieldKind::Text),
        FieldModel::new("edge", FieldKind::Text),
        FieldModel::new("to", FieldKind::Text),
    ];
    const INDEXES: &'static [IndexDescriptor] = &[IndexDescriptor::new(
        "social",
        IndexKind::GraphAdjacency {
            bidirectional: false,
        },
        &["from", "edge", "to"],
    )];

    fn primary_key(&self) -> Tuple {
        Tuple::new(vec![TupleElement::Int(self.id)])
    }

    fn reset_field(&mut self, name: &str) {
        match name {
            "from" => self.from = String::new(),
            "edge" => self.edge = String::new(),
            "to" => self.to = String::new(),
            _ => {}
        }
    }
}

///
/// Attachment
/// Large-value fixture: the `data` field drives the chunking paths.
///

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct Attachment {
    pub id: String,
    pub name: String,
    pub data: ByteBuf,
}

impl RecordRead for Attachment {
    fn field_value(&self, name: &str) -> FieldValue {
        match name {
            "id" => FieldValue::String(self.id.clone()),
            "name" => FieldValue::String(self.name.clone()),
            "data" => FieldValue::Bytes(self.data.to_vec()),
            _ => FieldValue::Null,
        }
    }
}

impl RecordKind for Attachment {
    const RECORD_NAME: &'static str = "Attachment";
    const DIRECTORY: &'static [&'static str] = &["app", "attachments"];
    const FIELDS: &'static [FieldModel] = &[
        FieldModel::new("id", FieldKind::Text),
        FieldModel::new("name", FieldKind::Text),
        FieldModel::new("data", FieldKind::Bytes),
    ];
    const INDEXES: &'static [IndexDescriptor] = &[];

    fn primary_key(&self) -> Tuple {
        string_key(&self.id)
    }

    fn reset_field(&mut self, name: &str) {
        match name {
            "name" => self.name = String::new(),
            "data" => self.data = ByteBuf::new(),
            _ => {}
        }
    }
}

///
/// Track
/// Rank and vector fixture.
///

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct Track {
    pub id: String,
    pub title: String,
    pub plays: i64,
    pub embedding: Vec<f64>,
}

impl RecordRead for Track {
    fn field_value(&self, name: &str) -> FieldValue {
        match name {
            "id" => FieldValue::String(self.id.clone()),
            "title" => FieldValue::String(self.title.clone()),
            "plays" => FieldValue::Int(self.plays),
            "embedding" => FieldValue::Array(
                self.embedding.iter().map(|v| FieldValue::Double(*v)).collect(),
            ),
            _ => FieldValue::Null,
        }
    }
}

impl RecordKind for Track {
    const RECORD_NAME: &'static str = "Track";
    const DIRECTORY: &'static [&'static str] = &["app", "tracks"];
    const FIELDS: &'static [FieldModel] = &[
        FieldModel::new("id", FieldKind::Text),
        FieldModel::new("title", FieldKind::Text),
        FieldModel::new("plays", FieldKind::Int),
        FieldModel::new("embedding", FieldKind::Array),
    ];
    const INDEXES: &'static [IndexDescriptor] = &[
        IndexDescriptor::new("by_plays", IndexKind::Rank, &["plays"]),
        IndexDescriptor::new(
            "similar",
            IndexKind::Vector {
                metric: VectorMetric::Cosine,
            },
            &["embedding"],
        ),
    ];

    fn primary_key(&self) -> Tuple {
        string_key(&self.id)
    }

    fn reset_field(&mut self, name: &str) {
        match name {
            "title" => self.title = String::new(),
            "plays" => self.plays = 0,
            "embedding" => self.embedding = Vec::new(),
            _ => {}
        }
    }
}
