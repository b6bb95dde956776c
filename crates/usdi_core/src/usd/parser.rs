//! Recursive-descent parser for the textual scene language.
//!
//! Builds a [`Stage`] from a token stream. The parser is deliberately
//! lenient: unknown constructs and malformed values never abort the
//! parse. Anything unrecognized is skipped to the next balanced
//! boundary and the surrounding structure keeps parsing, so one bad
//! attribute cannot take a whole stage down. Only file-level I/O
//! errors are surfaced, and those belong to [`Stage::load`].
//!
//! # Recognized structure
//!
//! - stage metadata in `( ... )` (`defaultPrim`, `upAxis`,
//!   `metersPerUnit`, time codes, `subLayers`, documentation)
//! - prims: `def|over|class [Type] "Name" [(metadata)] { body }`
//! - prim metadata: `references`, `payload(s)`, `inherits`,
//!   `apiSchemas`, `kind`, `instanceable`, `variants`, `variantSets`,
//!   `customData`, with `prepend`/`append` modifiers
//! - bodies: nested prims, `variantSet "name" = { ... }`, attributes,
//!   and `rel` relationships

use std::path::PathBuf;

use usdi_math::{Mat4, Vec2, Vec3, Vec4};

use super::stage::{Prim, PrimId, Reference, Relationship, Specifier, Stage, UpAxis};
use super::tokenizer::{Token, TokenKind, Tokenizer};
use super::value::{ScalarType, Value};

/// Parse a stage from source text. Never fails; see the module docs
/// for the error policy.
pub fn parse_stage(content: &str, source_path: PathBuf) -> Stage {
    let mut parser = Parser::new(content, source_path);
    parser.parse();
    parser.stage
}

/// Metadata modifier keywords that do not change semantics for this
/// reader.
const LIST_EDIT_MODIFIERS: &[&str] = &["prepend", "append", "add", "delete", "reorder"];

struct Parser<'a> {
    tokens: Tokenizer<'a>,
    current: Token,
    stage: Stage,
}

impl<'a> Parser<'a> {
    fn new(content: &'a str, source_path: PathBuf) -> Self {
        let mut tokens = Tokenizer::new(content);
        let current = tokens.next_token();
        Self {
            tokens,
            current,
            stage: Stage::new(source_path),
        }
    }

    fn advance(&mut self) -> TokenKind {
        let next = self.tokens.next_token();
        std::mem::replace(&mut self.current, next).kind
    }

    fn at_eof(&self) -> bool {
        self.current.kind == TokenKind::Eof
    }

    /// Consume the current token if it matches `kind` exactly.
    fn eat(&mut self, kind: &TokenKind) -> bool {
        if &self.current.kind == kind {
            self.advance();
            true
        } else {
            false
        }
    }

    fn is_ident(&self, text: &str) -> bool {
        matches!(&self.current.kind, TokenKind::Ident(s) if s == text)
    }

    // ------------------------------------------------------------------
    // Skipping
    // ------------------------------------------------------------------

    /// Skip tokens until the closer matching `opener` at depth 0.
    /// The opener token itself must already be consumed.
    fn skip_balanced(&mut self, opener: &TokenKind) {
        let closer = match opener {
            TokenKind::LParen => TokenKind::RParen,
            TokenKind::LBracket => TokenKind::RBracket,
            TokenKind::LBrace => TokenKind::RBrace,
            _ => return,
        };

        let mut depth = 1usize;
        while !self.at_eof() {
            if self.current.kind == *opener {
                depth += 1;
            } else if self.current.kind == closer {
                depth -= 1;
                if depth == 0 {
                    self.advance();
                    return;
                }
            }
            self.advance();
        }
    }

    /// Skip one balanced value: a bracketed construct in full, or a
    /// single scalar token.
    fn skip_value(&mut self) {
        match self.current.kind.clone() {
            k @ (TokenKind::LParen | TokenKind::LBracket | TokenKind::LBrace) => {
                self.advance();
                self.skip_balanced(&k);
            }
            TokenKind::Eof => {}
            _ => {
                self.advance();
            }
        }
    }

    // ------------------------------------------------------------------
    // Stage level
    // ------------------------------------------------------------------

    fn parse(&mut self) {
        // The `#usda 1.0` header is comment-shaped and already gone;
        // an optional stage metadata block comes first.
        if self.current.kind == TokenKind::LParen {
            self.parse_stage_metadata();
        }

        while !self.at_eof() {
            if let Some(spec) = self.current_specifier() {
                if let Some(id) = self.parse_prim(spec, None, "") {
                    self.stage.root_prims.push(id);
                }
            } else {
                // Stray token at stage level.
                self.advance();
            }
        }
    }

    fn current_specifier(&self) -> Option<Specifier> {
        match self.current.kind.as_ident()? {
            "def" => Some(Specifier::Def),
            "over" => Some(Specifier::Over),
            "class" => Some(Specifier::Class),
            _ => None,
        }
    }

    fn parse_stage_metadata(&mut self) {
        self.advance(); // (

        while !self.at_eof() && self.current.kind != TokenKind::RParen {
            match self.current.kind.clone() {
                // A bare string is the stage documentation.
                TokenKind::Str(s) => {
                    self.advance();
                    self.stage.doc = Some(s);
                }
                TokenKind::Ident(key) => {
                    self.advance();
                    if !self.eat(&TokenKind::Equals) {
                        continue;
                    }
                    match key.as_str() {
                        "defaultPrim" => {
                            if let Some(s) = self.take_text() {
                                self.stage.default_prim = Some(s);
                            }
                        }
                        "upAxis" => {
                            if let Some(s) = self.take_text() {
                                match s.as_str() {
                                    "Z" | "z" => self.stage.up_axis = UpAxis::Z,
                                    _ => self.stage.up_axis = UpAxis::Y,
                                }
                            }
                        }
                        "metersPerUnit" => {
                            if let Some(n) = self.take_number() {
                                self.stage.meters_per_unit = n;
                            }
                        }
                        "timeCodesPerSecond" => self.stage.time_codes_per_second = self.take_number(),
                        "framesPerSecond" => self.stage.frames_per_second = self.take_number(),
                        "startTimeCode" => self.stage.start_time_code = self.take_number(),
                        "endTimeCode" => self.stage.end_time_code = self.take_number(),
                        "subLayers" => {
                            self.stage.sub_layers = self.take_path_string_list();
                        }
                        "doc" | "documentation" => {
                            if let Some(s) = self.take_text() {
                                self.stage.doc = Some(s);
                            }
                        }
                        _ => self.skip_value(),
                    }
                }
                _ => {
                    self.advance();
                }
            }
        }
        self.eat(&TokenKind::RParen);
    }

    // ------------------------------------------------------------------
    // Value-shaped helpers
    // ------------------------------------------------------------------

    /// Take a string/token/asset text value, or skip whatever is there.
    /// Bare identifiers are accepted too; some exporters leave tokens
    /// unquoted.
    fn take_text(&mut self) -> Option<String> {
        match self.current.kind.clone() {
            TokenKind::Str(s) | TokenKind::Asset(s) | TokenKind::Ident(s) => {
                self.advance();
                Some(s)
            }
            _ => {
                self.skip_value();
                None
            }
        }
    }

    fn take_number(&mut self) -> Option<f64> {
        match self.current.kind {
            TokenKind::Int(v) => {
                self.advance();
                Some(v as f64)
            }
            TokenKind::Float(v) => {
                self.advance();
                Some(v)
            }
            _ => {
                self.skip_value();
                None
            }
        }
    }

    /// A single path string or a bracketed list of them. Accepts both
    /// quoted strings and `@...@` asset paths.
    fn take_path_string_list(&mut self) -> Vec<String> {
        let mut out = Vec::new();
        match self.current.kind.clone() {
            TokenKind::LBracket => {
                self.advance();
                while !self.at_eof() && self.current.kind != TokenKind::RBracket {
                    match self.current.kind.clone() {
                        TokenKind::Str(s) | TokenKind::Asset(s) => {
                            self.advance();
                            out.push(s);
                        }
                        TokenKind::Comma => {
                            self.advance();
                        }
                        _ => self.skip_value(),
                    }
                }
                self.eat(&TokenKind::RBracket);
            }
            TokenKind::Str(s) | TokenKind::Asset(s) => {
                self.advance();
                out.push(s);
            }
            _ => self.skip_value(),
        }
        out
    }

    /// One composition arc: `@asset@` with an optional `</prim>` suffix.
    fn take_arc(&mut self) -> Option<Reference> {
        let asset_path = match self.current.kind.clone() {
            TokenKind::Asset(s) => {
                self.advance();
                s
            }
            _ => return None,
        };
        let prim_path = match self.current.kind.clone() {
            TokenKind::PathRef(p) => {
                self.advance();
                Some(p)
            }
            _ => None,
        };
        Some(Reference {
            asset_path,
            prim_path,
        })
    }

    /// A single arc or a bracketed arc list. `None` (the keyword) and
    /// anything unrecognized yield an empty list.
    fn take_arc_list(&mut self) -> Vec<Reference> {
        let mut out = Vec::new();
        match self.current.kind.clone() {
            TokenKind::LBracket => {
                self.advance();
                while !self.at_eof() && self.current.kind != TokenKind::RBracket {
                    if let Some(arc) = self.take_arc() {
                        out.push(arc);
                    } else if !self.eat(&TokenKind::Comma) {
                        self.skip_value();
                    }
                }
                self.eat(&TokenKind::RBracket);
            }
            TokenKind::Asset(_) => {
                if let Some(arc) = self.take_arc() {
                    out.push(arc);
                }
            }
            _ => self.skip_value(),
        }
        out
    }

    /// A single `<path>` or a bracketed list of them.
    fn take_path_ref_list(&mut self) -> Vec<String> {
        let mut out = Vec::new();
        match self.current.kind.clone() {
            TokenKind::LBracket => {
                self.advance();
                while !self.at_eof() && self.current.kind != TokenKind::RBracket {
                    match self.current.kind.clone() {
                        TokenKind::PathRef(p) => {
                            self.advance();
                            out.push(p);
                        }
                        TokenKind::Comma => {
                            self.advance();
                        }
                        _ => self.skip_value(),
                    }
                }
                self.eat(&TokenKind::RBracket);
            }
            TokenKind::PathRef(p) => {
                self.advance();
                out.push(p);
            }
            _ => self.skip_value(),
        }
        out
    }

    // ------------------------------------------------------------------
    // Prims
    // ------------------------------------------------------------------

    /// Parse one prim after its specifier keyword. Returns the arena
    /// id, or `None` when the definition is too malformed to keep.
    fn parse_prim(&mut self, specifier: Specifier, parent: Option<PrimId>, parent_path: &str) -> Option<PrimId> {
        self.advance(); // def | over | class

        let mut type_name = String::new();
        if let TokenKind::Ident(t) = self.current.kind.clone() {
            self.advance();
            type_name = t;
        }

        let name = match self.current.kind.clone() {
            TokenKind::Str(s) => {
                self.advance();
                s
            }
            _ => {
                // No name: drop the whole definition.
                log::warn!(
                    "skipping unnamed prim near line {}",
                    self.current.line
                );
                if self.current.kind == TokenKind::LParen {
                    self.advance();
                    self.skip_balanced(&TokenKind::LParen);
                }
                if self.current.kind == TokenKind::LBrace {
                    self.advance();
                    self.skip_balanced(&TokenKind::LBrace);
                }
                return None;
            }
        };

        let path = if parent_path.is_empty() {
            format!("/{}", name)
        } else {
            format!("{}/{}", parent_path, name)
        };

        let mut prim = Prim::new(&name, path.clone(), specifier, parent);
        prim.type_name = type_name;
        let id = self.stage.alloc_prim(prim);

        if self.current.kind == TokenKind::LParen {
            self.parse_prim_metadata(id);
        }

        if self.eat(&TokenKind::LBrace) {
            self.parse_prim_body(id, &path);
        }

        Some(id)
    }

    fn parse_prim_metadata(&mut self, id: PrimId) {
        self.advance(); // (

        while !self.at_eof() && self.current.kind != TokenKind::RParen {
            let key = match self.current.kind.clone() {
                TokenKind::Str(s) => {
                    // Bare string: prim documentation.
                    self.advance();
                    self.stage
                        .prim_mut(id)
                        .metadata
                        .insert("documentation".into(), Value::Str(s));
                    continue;
                }
                TokenKind::Ident(k) => {
                    self.advance();
                    k
                }
                _ => {
                    self.advance();
                    continue;
                }
            };

            // `prepend references = ...` and friends: the modifier
            // does not change semantics for this reader.
            let key = if LIST_EDIT_MODIFIERS.contains(&key.as_str()) {
                match self.current.kind.clone() {
                    TokenKind::Ident(k) => {
                        self.advance();
                        k
                    }
                    _ => continue,
                }
            } else {
                key
            };

            if !self.eat(&TokenKind::Equals) {
                continue;
            }

            match key.as_str() {
                "references" => {
                    let arcs = self.take_arc_list();
                    self.stage.prim_mut(id).references.extend(arcs);
                }
                "payload" | "payloads" => {
                    let arcs = self.take_arc_list();
                    self.stage.prim_mut(id).payloads.extend(arcs);
                }
                "inherits" => {
                    let paths = self.take_path_ref_list();
                    self.stage.prim_mut(id).inherits.extend(paths);
                }
                "apiSchemas" => {
                    let names = self.take_path_string_list();
                    self.stage.prim_mut(id).api_schemas.extend(names);
                }
                "kind" => {
                    if let Some(s) = self.take_text() {
                        self.stage.prim_mut(id).metadata.insert("kind".into(), Value::Token(s));
                    }
                }
                "instanceable" => {
                    let v = matches!(self.current.kind.as_ident(), Some("true"));
                    self.skip_value();
                    self.stage
                        .prim_mut(id)
                        .metadata
                        .insert("instanceable".into(), Value::Bool(v));
                }
                "variants" => self.parse_variant_selections(id),
                "variantSets" => {
                    // Declares set names only; content arrives via
                    // `variantSet` statements in the body.
                    for name in self.take_path_string_list() {
                        self.stage
                            .prim_mut(id)
                            .variant_sets
                            .entry(name)
                            .or_default();
                    }
                }
                "customData" => self.skip_value(),
                _ => self.skip_value(),
            }
        }
        self.eat(&TokenKind::RParen);
    }

    /// `variants = { string lod = "lod1" ... }`
    fn parse_variant_selections(&mut self, id: PrimId) {
        if !self.eat(&TokenKind::LBrace) {
            self.skip_value();
            return;
        }
        while !self.at_eof() && self.current.kind != TokenKind::RBrace {
            // Each entry is `type name = "value"`; the type is noise.
            let mut name = match self.current.kind.clone() {
                TokenKind::Ident(s) => {
                    self.advance();
                    s
                }
                _ => {
                    self.advance();
                    continue;
                }
            };
            if let TokenKind::Ident(second) = self.current.kind.clone() {
                self.advance();
                name = second;
            }
            if !self.eat(&TokenKind::Equals) {
                continue;
            }
            if let Some(value) = self.take_text() {
                self.stage.prim_mut(id).variant_selections.insert(name, value);
            }
        }
        self.eat(&TokenKind::RBrace);
    }

    fn parse_prim_body(&mut self, id: PrimId, path: &str) {
        while !self.at_eof() && self.current.kind != TokenKind::RBrace {
            if let Some(spec) = self.current_specifier() {
                if let Some(child) = self.parse_prim(spec, Some(id), path) {
                    self.stage.prim_mut(id).children.push(child);
                }
                continue;
            }

            if self.is_ident("variantSet") {
                self.parse_variant_set(id, path);
                continue;
            }

            match self.current.kind.clone() {
                TokenKind::Ident(_) => self.parse_property(id),
                _ => {
                    self.advance();
                }
            }
        }
        self.eat(&TokenKind::RBrace);
    }

    /// `variantSet "name" = { "variant" (meta) { body } ... }`
    fn parse_variant_set(&mut self, id: PrimId, prim_path: &str) {
        self.advance(); // variantSet

        let set_name = match self.current.kind.clone() {
            TokenKind::Str(s) => {
                self.advance();
                s
            }
            _ => {
                self.skip_value();
                return;
            }
        };
        if !self.eat(&TokenKind::Equals) {
            return;
        }
        if !self.eat(&TokenKind::LBrace) {
            self.skip_value();
            return;
        }

        let mut set = self.stage.prim_mut(id).variant_sets.shift_remove(&set_name).unwrap_or_default();

        while !self.at_eof() && self.current.kind != TokenKind::RBrace {
            let variant_name = match self.current.kind.clone() {
                TokenKind::Str(s) => {
                    self.advance();
                    s
                }
                _ => {
                    self.advance();
                    continue;
                }
            };

            // The variant body is held by a nested prim that is not a
            // child: it only participates when the variant is chosen.
            let variant_path = format!("{}{{{}={}}}", prim_path, set_name, variant_name);
            let nested = self
                .stage
                .alloc_prim(Prim::new(&variant_name, variant_path, Specifier::Def, Some(id)));

            if self.current.kind == TokenKind::LParen {
                self.parse_prim_metadata(nested);
            }
            if self.eat(&TokenKind::LBrace) {
                // Children compose under the owning prim's path.
                self.parse_prim_body(nested, prim_path);
            }

            set.variants.insert(variant_name, nested);
        }
        self.eat(&TokenKind::RBrace);

        self.stage.prim_mut(id).variant_sets.insert(set_name, set);
    }

    // ------------------------------------------------------------------
    // Properties
    // ------------------------------------------------------------------

    /// Possibly-namespaced property name (`primvars:st:indices`).
    fn take_property_name(&mut self) -> Option<String> {
        let mut name = match self.current.kind.clone() {
            TokenKind::Ident(s) => {
                self.advance();
                s
            }
            _ => return None,
        };
        while self.current.kind == TokenKind::Colon {
            self.advance();
            match self.current.kind.clone() {
                TokenKind::Ident(s) => {
                    self.advance();
                    name.push(':');
                    name.push_str(&s);
                }
                _ => break,
            }
        }
        Some(name)
    }

    /// An attribute or relationship inside a prim body.
    fn parse_property(&mut self, id: PrimId) {
        // Leading modifiers carry no meaning here.
        while matches!(
            self.current.kind.as_ident(),
            Some("prepend" | "append" | "add" | "delete" | "uniform" | "custom")
        ) {
            self.advance();
        }

        if self.is_ident("rel") {
            self.advance();
            self.parse_relationship(id);
            return;
        }

        let type_name = match self.current.kind.clone() {
            TokenKind::Ident(s) => {
                self.advance();
                s
            }
            // Modifiers with nothing declarable after them; leave the
            // current token for the body loop.
            _ => return,
        };

        let mut is_array = false;
        if self.current.kind == TokenKind::LBracket {
            self.advance();
            self.eat(&TokenKind::RBracket);
            is_array = true;
        }

        let name = match self.take_property_name() {
            Some(n) => n,
            None => {
                // Type keyword with nothing nameable after it.
                self.skip_value();
                return;
            }
        };

        // `.timeSamples` / `.connect` suffixed properties are animation
        // and shading plumbing; consume and drop.
        if self.current.kind == TokenKind::Dot {
            self.advance();
            if matches!(self.current.kind, TokenKind::Ident(_)) {
                self.advance();
            }
            if self.eat(&TokenKind::Equals) {
                self.skip_value();
            }
            return;
        }

        if !self.eat(&TokenKind::Equals) {
            // Declaration without a value; an optional metadata block
            // may still follow.
            if self.current.kind == TokenKind::LParen {
                self.advance();
                self.skip_balanced(&TokenKind::LParen);
            }
            return;
        }

        if self.is_ident("None") {
            self.advance();
            return;
        }

        let value = match ScalarType::from_type_name(&type_name) {
            Some(scalar) => {
                if is_array {
                    self.parse_array_value(scalar)
                } else {
                    self.parse_scalar_value(scalar)
                }
            }
            None => {
                // Unknown type: consume one balanced value, keep nothing.
                self.skip_value();
                None
            }
        };

        if let Some(value) = value {
            self.stage.prim_mut(id).attributes.insert(name, value);
        }

        // Trailing attribute metadata block.
        if self.current.kind == TokenKind::LParen {
            self.advance();
            self.skip_balanced(&TokenKind::LParen);
        }
    }

    /// `rel name [= <path> | [<path>, ...]]`
    fn parse_relationship(&mut self, id: PrimId) {
        let name = match self.take_property_name() {
            Some(n) => n,
            None => {
                self.skip_value();
                return;
            }
        };

        let targets = if self.eat(&TokenKind::Equals) {
            self.take_path_ref_list()
        } else {
            Vec::new()
        };

        if self.current.kind == TokenKind::LParen {
            self.advance();
            self.skip_balanced(&TokenKind::LParen);
        }

        self.stage.prim_mut(id).relationships.push(Relationship { name, targets });
    }

    // ------------------------------------------------------------------
    // Typed literals
    // ------------------------------------------------------------------

    fn parse_number(&mut self) -> Option<f64> {
        match self.current.kind {
            TokenKind::Int(v) => {
                self.advance();
                Some(v as f64)
            }
            TokenKind::Float(v) => {
                self.advance();
                Some(v)
            }
            _ => None,
        }
    }

    /// `(a, b, ...)` with exactly `n` numeric components.
    fn parse_tuple(&mut self, n: usize) -> Option<Vec<f64>> {
        if !self.eat(&TokenKind::LParen) {
            self.skip_value();
            return None;
        }
        let mut out = Vec::with_capacity(n);
        let mut ok = true;
        while !self.at_eof() && self.current.kind != TokenKind::RParen {
            if self.eat(&TokenKind::Comma) {
                continue;
            }
            match self.parse_number() {
                Some(v) => out.push(v),
                None => {
                    ok = false;
                    self.skip_value();
                }
            }
        }
        self.eat(&TokenKind::RParen);
        if ok && out.len() == n {
            Some(out)
        } else {
            None
        }
    }

    /// `( (r0), (r1), (r2), (r3) )`, each row a 4-tuple. Rows are the
    /// basis vectors (translation last), so they become glam columns.
    fn parse_matrix(&mut self) -> Option<Mat4> {
        if !self.eat(&TokenKind::LParen) {
            self.skip_value();
            return None;
        }
        let mut rows: Vec<Vec4> = Vec::with_capacity(4);
        let mut ok = true;
        while !self.at_eof() && self.current.kind != TokenKind::RParen {
            if self.eat(&TokenKind::Comma) {
                continue;
            }
            match self.parse_tuple(4) {
                Some(row) => rows.push(Vec4::new(
                    row[0] as f32,
                    row[1] as f32,
                    row[2] as f32,
                    row[3] as f32,
                )),
                None => ok = false,
            }
        }
        self.eat(&TokenKind::RParen);
        if ok && rows.len() == 4 {
            Some(Mat4::from_cols(rows[0], rows[1], rows[2], rows[3]))
        } else {
            None
        }
    }

    fn parse_scalar_value(&mut self, scalar: ScalarType) -> Option<Value> {
        match scalar {
            ScalarType::Bool => match self.current.kind.as_ident() {
                Some("true") => {
                    self.advance();
                    Some(Value::Bool(true))
                }
                Some("false") => {
                    self.advance();
                    Some(Value::Bool(false))
                }
                _ => {
                    self.skip_value();
                    None
                }
            },
            ScalarType::Int => {
                let v = self.parse_number().or_else(|| {
                    self.skip_value();
                    None
                })?;
                Some(Value::Int(v as i32))
            }
            ScalarType::Float => {
                let v = self.parse_number().or_else(|| {
                    self.skip_value();
                    None
                })?;
                Some(Value::Float(v as f32))
            }
            ScalarType::Double => {
                let v = self.parse_number().or_else(|| {
                    self.skip_value();
                    None
                })?;
                Some(Value::Double(v))
            }
            ScalarType::Str => match self.current.kind.clone() {
                TokenKind::Str(s) => {
                    self.advance();
                    Some(Value::Str(s))
                }
                _ => {
                    self.skip_value();
                    None
                }
            },
            ScalarType::Token => match self.current.kind.clone() {
                TokenKind::Str(s) => {
                    self.advance();
                    Some(Value::Token(s))
                }
                _ => {
                    self.skip_value();
                    None
                }
            },
            ScalarType::Asset => match self.current.kind.clone() {
                TokenKind::Asset(s) | TokenKind::Str(s) => {
                    self.advance();
                    Some(Value::Asset(s))
                }
                _ => {
                    self.skip_value();
                    None
                }
            },
            ScalarType::Vec2 => {
                let t = self.parse_tuple(2)?;
                Some(Value::Vec2(Vec2::new(t[0] as f32, t[1] as f32)))
            }
            ScalarType::Vec3 => {
                let t = self.parse_tuple(3)?;
                Some(Value::Vec3(Vec3::new(t[0] as f32, t[1] as f32, t[2] as f32)))
            }
            ScalarType::Vec4 => {
                let t = self.parse_tuple(4)?;
                Some(Value::Vec4(Vec4::new(
                    t[0] as f32,
                    t[1] as f32,
                    t[2] as f32,
                    t[3] as f32,
                )))
            }
            ScalarType::Matrix => self.parse_matrix().map(Value::Matrix),
        }
    }

    fn parse_array_value(&mut self, scalar: ScalarType) -> Option<Value> {
        if !self.eat(&TokenKind::LBracket) {
            self.skip_value();
            return None;
        }

        macro_rules! collect {
            ($parse:expr, $wrap:expr) => {{
                let mut out = Vec::new();
                while !self.at_eof() && self.current.kind != TokenKind::RBracket {
                    if self.eat(&TokenKind::Comma) {
                        continue;
                    }
                    match $parse(self) {
                        Some(v) => out.push(v),
                        None => {
                            // A failed item parse may already have
                            // consumed tokens; only skip when stuck on
                            // something that is not a separator.
                            if !matches!(
                                self.current.kind,
                                TokenKind::Comma | TokenKind::RBracket
                            ) {
                                self.skip_value();
                            }
                        }
                    }
                }
                self.eat(&TokenKind::RBracket);
                Some($wrap(out))
            }};
        }

        match scalar {
            ScalarType::Bool => collect!(
                |p: &mut Self| match p.current.kind.as_ident() {
                    Some("true") => {
                        p.advance();
                        Some(true)
                    }
                    Some("false") => {
                        p.advance();
                        Some(false)
                    }
                    _ => None,
                },
                Value::BoolArray
            ),
            ScalarType::Int => collect!(
                |p: &mut Self| p.parse_number().map(|v| v as i32),
                Value::IntArray
            ),
            ScalarType::Float => collect!(
                |p: &mut Self| p.parse_number().map(|v| v as f32),
                Value::FloatArray
            ),
            ScalarType::Double => collect!(|p: &mut Self| p.parse_number(), Value::DoubleArray),
            ScalarType::Str => collect!(
                |p: &mut Self| match p.current.kind.clone() {
                    TokenKind::Str(s) => {
                        p.advance();
                        Some(s)
                    }
                    _ => None,
                },
                Value::StrArray
            ),
            ScalarType::Token => collect!(
                |p: &mut Self| match p.current.kind.clone() {
                    TokenKind::Str(s) => {
                        p.advance();
                        Some(s)
                    }
                    _ => None,
                },
                Value::TokenArray
            ),
            ScalarType::Asset => collect!(
                |p: &mut Self| match p.current.kind.clone() {
                    TokenKind::Asset(s) | TokenKind::Str(s) => {
                        p.advance();
                        Some(s)
                    }
                    _ => None,
                },
                Value::AssetArray
            ),
            ScalarType::Vec2 => collect!(
                |p: &mut Self| p
                    .parse_tuple(2)
                    .map(|t| Vec2::new(t[0] as f32, t[1] as f32)),
                Value::Vec2Array
            ),
            ScalarType::Vec3 => collect!(
                |p: &mut Self| p
                    .parse_tuple(3)
                    .map(|t| Vec3::new(t[0] as f32, t[1] as f32, t[2] as f32)),
                Value::Vec3Array
            ),
            ScalarType::Vec4 => collect!(
                |p: &mut Self| p
                    .parse_tuple(4)
                    .map(|t| Vec4::new(t[0] as f32, t[1] as f32, t[2] as f32, t[3] as f32)),
                Value::Vec4Array
            ),
            ScalarType::Matrix => collect!(|p: &mut Self| p.parse_matrix(), Value::MatrixArray),
        }
    }
}
