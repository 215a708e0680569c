//! Table file state machine
//!
//! A table file is processed line by line in one of four modes:
//! idle (no `table` header yet), table body, object properties, and
//! expression capture. Open objects live on a stack of frames; each frame
//! remembers the indentation of its header line, and any non-blank line at
//! or above that indentation closes it.

use std::collections::HashMap;

use semlineage_core::{
    CalculationGroup, CalculationItem, Column, DiagnosticCode, Hierarchy, Level, Measure, Partition,
    Table,
};

use crate::lines::{
    classify_body_line, extract_name, indent_of, indent_unit, is_blank, is_structural, parse_bool,
    split_assignment, split_first_word, unquote, BodyLine, ExpressionCapture, WarningSink,
};

/// Keywords that open an object inside a table
const OBJECT_KEYWORDS: &[&str] = &[
    "table",
    "column",
    "measure",
    "hierarchy",
    "level",
    "partition",
    "calculationGroup",
    "calculationItem",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ObjectKind {
    Column,
    Measure,
    Hierarchy,
    Level,
    Partition,
    CalculationGroup,
    CalculationItem,
}

impl ObjectKind {
    fn from_keyword(word: &str) -> Option<Self> {
        match word {
            "column" => Some(Self::Column),
            "measure" => Some(Self::Measure),
            "hierarchy" => Some(Self::Hierarchy),
            "level" => Some(Self::Level),
            "partition" => Some(Self::Partition),
            "calculationGroup" => Some(Self::CalculationGroup),
            "calculationItem" => Some(Self::CalculationItem),
            _ => None,
        }
    }

    fn keyword(&self) -> &'static str {
        match self {
            Self::Column => "column",
            Self::Measure => "measure",
            Self::Hierarchy => "hierarchy",
            Self::Level => "level",
            Self::Partition => "partition",
            Self::CalculationGroup => "calculationGroup",
            Self::CalculationItem => "calculationItem",
        }
    }

    /// Object kind this kind must be nested in, if any
    fn parent(&self) -> Option<ObjectKind> {
        match self {
            Self::Level => Some(Self::Hierarchy),
            Self::CalculationItem => Some(Self::CalculationGroup),
            _ => None,
        }
    }

    /// Whether `kind Name = ...` carries an expression body
    fn has_expression(&self) -> bool {
        matches!(self, Self::Column | Self::Measure | Self::CalculationItem)
    }
}

/// An object whose header has been seen but which is not finalized yet
#[derive(Debug)]
struct ObjectFrame {
    kind: ObjectKind,
    name: String,
    base_indent: usize,
    line: usize,
    description: Option<String>,
    /// Text after `=` on a partition header (`m`, `calculated`...)
    header_value: Option<String>,
    expression: Option<String>,
    props: HashMap<String, String>,
    levels: Vec<Level>,
    items: Vec<CalculationItem>,
}

impl ObjectFrame {
    fn new(kind: ObjectKind, name: String, base_indent: usize, line: usize) -> Self {
        Self {
            kind,
            name,
            base_indent,
            line,
            description: None,
            header_value: None,
            expression: None,
            props: HashMap::new(),
            levels: Vec::new(),
            items: Vec::new(),
        }
    }

    fn prop(&self, key: &str) -> Option<String> {
        self.props.get(key).map(|v| unquote(v))
    }

    fn flag(&self, key: &str) -> bool {
        self.props.get(key).map_or(false, |v| parse_bool(v))
    }

    fn description(&self) -> Option<String> {
        self.description.clone().or_else(|| self.prop("description"))
    }

    fn has_empty_expression(&self) -> bool {
        self.expression.as_deref().map_or(true, |e| e.trim().is_empty())
    }

    fn into_column(self) -> Column {
        Column {
            data_type: self.prop("dataType"),
            format_string: self.prop("formatString"),
            is_hidden: self.flag("isHidden"),
            source_column: self.prop("sourceColumn"),
            summarize_by: self.prop("summarizeBy"),
            description: self.description(),
            display_folder: self.prop("displayFolder"),
            data_category: self.prop("dataCategory"),
            sort_by_column: self.prop("sortByColumn"),
            lineage_tag: self.prop("lineageTag"),
            expression: self.expression.filter(|e| !e.trim().is_empty()),
            name: self.name,
        }
    }

    fn into_measure(self) -> Measure {
        Measure {
            display_folder: self.prop("displayFolder"),
            format_string: self.prop("formatString"),
            data_category: self.prop("dataCategory"),
            description: self.description(),
            is_hidden: self.flag("isHidden"),
            lineage_tag: self.prop("lineageTag"),
            expression: self.expression.unwrap_or_default(),
            name: self.name,
        }
    }

    fn into_hierarchy(mut self) -> Hierarchy {
        self.levels.sort_by_key(|level| level.ordinal);
        Hierarchy {
            description: self.description(),
            is_hidden: self.flag("isHidden"),
            levels: self.levels,
            name: self.name,
        }
    }

    fn into_level(self, ordinal: usize) -> Level {
        Level {
            column: self.prop("column").unwrap_or_default(),
            ordinal,
            name: self.name,
        }
    }

    fn into_partition(self) -> Partition {
        Partition {
            mode: self.prop("mode"),
            source_type: self
                .header_value
                .clone()
                .filter(|v| !v.is_empty())
                .or_else(|| self.prop("sourceType")),
            source: self.expression.unwrap_or_default(),
            name: self.name,
        }
    }

    fn into_calculation_group(self) -> CalculationGroup {
        CalculationGroup {
            precedence: self.prop("precedence").and_then(|v| v.parse().ok()),
            description: self.description(),
            items: self.items,
        }
    }

    fn into_calculation_item(self) -> CalculationItem {
        CalculationItem {
            ordinal: self.prop("ordinal").and_then(|v| v.parse().ok()),
            format_string_definition: self.props.get("formatStringDefinition").cloned(),
            expression: self.expression.unwrap_or_default(),
            name: self.name,
        }
    }
}

/// Where a finished expression capture is stored
#[derive(Debug)]
enum CaptureTarget {
    /// Main expression of the innermost open object (`= ...`, `source =`)
    ObjectExpression,
    ObjectProperty(String),
    TableProperty(String),
    /// Annotation bodies
    Discard,
}

#[derive(Debug)]
enum Mode {
    Idle,
    TableBody,
    Properties,
    Expression {
        capture: ExpressionCapture,
        target: CaptureTarget,
    },
}

#[derive(Debug)]
struct TableBuilder {
    table: Table,
    indent: usize,
    props: HashMap<String, String>,
}

impl TableBuilder {
    fn finish(mut self) -> Table {
        let prop = |key: &str| self.props.get(key).map(|v| unquote(v));
        self.table.is_hidden = self.props.get("isHidden").map_or(false, |v| parse_bool(v));
        self.table.lineage_tag = prop("lineageTag");
        if self.table.description.is_none() {
            self.table.description = prop("description");
        }
        self.table
    }
}

/// Parse one `tables/*.tmdl` file
///
/// Usually yields exactly one table; files declaring several tables are
/// accepted as well.
pub(crate) fn parse_table_file(text: &str, sink: WarningSink<'_>) -> Vec<Table> {
    let lines: Vec<&str> = text.lines().collect();
    let mut parser = TableFileParser::new(sink, indent_unit(&lines));

    for (idx, line) in lines.iter().enumerate() {
        parser.feed(line, idx + 1);
    }

    parser.finish()
}

struct TableFileParser<'a> {
    sink: WarningSink<'a>,
    unit: usize,
    mode: Mode,
    stack: Vec<ObjectFrame>,
    current: Option<TableBuilder>,
    tables: Vec<Table>,
    pending_description: Vec<String>,
}

impl<'a> TableFileParser<'a> {
    fn new(sink: WarningSink<'a>, unit: usize) -> Self {
        Self {
            sink,
            unit,
            mode: Mode::Idle,
            stack: Vec::new(),
            current: None,
            tables: Vec::new(),
            pending_description: Vec::new(),
        }
    }

    fn feed(&mut self, line: &str, line_no: usize) {
        if let Mode::Expression { capture, .. } = &mut self.mode {
            if capture.offer(line, is_structural(line.trim(), OBJECT_KEYWORDS)) {
                return;
            }
            self.close_expression();
        }

        if is_blank(line) {
            return;
        }

        let indent = indent_of(line);
        let trimmed = line.trim();

        if let Some(doc) = trimmed.strip_prefix("///") {
            self.pending_description.push(doc.trim().to_string());
            return;
        }

        while self.stack.last().map_or(false, |frame| indent <= frame.base_indent) {
            self.finalize_object();
        }

        let (word, rest) = split_first_word(trimmed);
        if word == "table" {
            self.start_table(rest, indent);
            return;
        }
        if let Some(kind) = ObjectKind::from_keyword(word) {
            self.start_object(kind, rest, indent, line_no);
            return;
        }

        match &self.current {
            Some(current) if indent > current.indent => {}
            _ => {
                tracing::trace!(line = line_no, "skipping line outside of a table body");
                return;
            }
        }

        match classify_body_line(trimmed) {
            BodyLine::Property { key, value } => self.set_property(key, value),
            BodyLine::Flag(key) => self.set_property(key, "true"),
            BodyLine::ExpressionProperty { key, inline } => {
                let target = match (&self.mode, key) {
                    (Mode::Properties, "expression" | "source") => CaptureTarget::ObjectExpression,
                    (Mode::Properties, _) => CaptureTarget::ObjectProperty(key.to_string()),
                    _ => CaptureTarget::TableProperty(key.to_string()),
                };
                self.open_expression(inline, indent, indent, line_no, target);
            }
            BodyLine::Metadata { inline: Some(inline) } => {
                self.open_expression(inline, indent, indent, line_no, CaptureTarget::Discard);
            }
            BodyLine::Metadata { inline: None } | BodyLine::Other => {
                tracing::trace!(line = line_no, "skipping unrecognized line");
            }
        }
    }

    fn start_table(&mut self, rest: &str, indent: usize) {
        self.finalize_all_objects();
        self.finalize_table();

        let mut table = Table::new(extract_name(rest));
        table.description = self.take_description();
        self.current = Some(TableBuilder {
            table,
            indent,
            props: HashMap::new(),
        });
        self.mode = Mode::TableBody;
    }

    fn start_object(&mut self, kind: ObjectKind, rest: &str, indent: usize, line_no: usize) {
        let (head, inline) = split_assignment(rest);
        let name = extract_name(head);

        match kind.parent() {
            Some(parent) => {
                if self.stack.last().map_or(true, |frame| frame.kind != parent) {
                    self.sink.warn(
                        DiagnosticCode::TmdlOrphanObject,
                        line_no,
                        format!("{} '{}' is not inside a {}", kind.keyword(), name, parent.keyword()),
                    );
                }
            }
            None => self.finalize_all_objects(),
        }

        self.ensure_table(line_no);

        let mut frame = ObjectFrame::new(kind, name, indent, line_no);
        frame.description = self.take_description();
        if kind == ObjectKind::Partition {
            frame.header_value = inline.map(str::to_string);
        }
        self.stack.push(frame);
        self.mode = Mode::Properties;

        if let Some(inline) = inline.filter(|_| kind.has_expression()) {
            self.open_expression(inline, indent + self.unit, indent, line_no, CaptureTarget::ObjectExpression);
        }
    }

    /// Objects before any `table` header go to a table named after the file
    fn ensure_table(&mut self, line_no: usize) {
        if self.current.is_some() {
            return;
        }

        let stem = file_stem(self.sink.file());
        self.sink.warn(
            DiagnosticCode::TmdlMissingTableHeader,
            line_no,
            format!("object declared before any table header; assuming table '{}'", stem),
        );
        self.current = Some(TableBuilder {
            table: Table::new(stem),
            indent: 0,
            props: HashMap::new(),
        });
    }

    fn set_property(&mut self, key: &str, value: &str) {
        match self.mode {
            Mode::Properties => {
                if let Some(frame) = self.stack.last_mut() {
                    frame.props.insert(key.to_string(), value.to_string());
                }
            }
            Mode::TableBody => {
                if let Some(current) = self.current.as_mut() {
                    current.props.insert(key.to_string(), value.to_string());
                }
            }
            _ => {}
        }
    }

    fn open_expression(
        &mut self,
        inline: &str,
        threshold: usize,
        base: usize,
        line_no: usize,
        target: CaptureTarget,
    ) {
        self.mode = Mode::Expression {
            capture: ExpressionCapture::open(inline, threshold, base, line_no),
            target,
        };
    }

    fn close_expression(&mut self) {
        let mode = std::mem::replace(&mut self.mode, Mode::Idle);
        if let Mode::Expression { capture, target } = mode {
            let text = capture.finish();
            match target {
                CaptureTarget::ObjectExpression => {
                    if let Some(frame) = self.stack.last_mut() {
                        frame.expression = Some(text);
                    }
                }
                CaptureTarget::ObjectProperty(key) => {
                    if let Some(frame) = self.stack.last_mut() {
                        frame.props.insert(key, text);
                    }
                }
                CaptureTarget::TableProperty(key) => {
                    if let Some(current) = self.current.as_mut() {
                        current.props.insert(key, text);
                    }
                }
                CaptureTarget::Discard => {}
            }
        }
        self.mode = self.resting_mode();
    }

    fn resting_mode(&self) -> Mode {
        if !self.stack.is_empty() {
            Mode::Properties
        } else if self.current.is_some() {
            Mode::TableBody
        } else {
            Mode::Idle
        }
    }

    fn take_description(&mut self) -> Option<String> {
        if self.pending_description.is_empty() {
            return None;
        }
        let text = self.pending_description.join("\n");
        self.pending_description.clear();
        Some(text)
    }

    fn finalize_object(&mut self) {
        let Some(frame) = self.stack.pop() else {
            return;
        };

        if matches!(frame.kind, ObjectKind::Measure | ObjectKind::CalculationItem) && frame.has_empty_expression() {
            self.sink.warn(
                DiagnosticCode::TmdlEmptyExpression,
                frame.line,
                format!("{} '{}' has no expression", frame.kind.keyword(), frame.name),
            );
        }

        match frame.kind {
            ObjectKind::Level => {
                if let Some(parent) = self.stack.last_mut().filter(|p| p.kind == ObjectKind::Hierarchy) {
                    let ordinal = frame
                        .prop("ordinal")
                        .and_then(|v| v.parse().ok())
                        .unwrap_or(parent.levels.len());
                    parent.levels.push(frame.into_level(ordinal));
                }
            }
            ObjectKind::CalculationItem => {
                if let Some(parent) = self.stack.last_mut().filter(|p| p.kind == ObjectKind::CalculationGroup) {
                    parent.items.push(frame.into_calculation_item());
                }
            }
            _ => {
                if let Some(current) = self.current.as_mut() {
                    let table = &mut current.table;
                    match frame.kind {
                        ObjectKind::Column => table.columns.push(frame.into_column()),
                        ObjectKind::Measure => table.measures.push(frame.into_measure()),
                        ObjectKind::Hierarchy => table.hierarchies.push(frame.into_hierarchy()),
                        ObjectKind::Partition => table.partitions.push(frame.into_partition()),
                        ObjectKind::CalculationGroup => {
                            table.calculation_group = Some(frame.into_calculation_group())
                        }
                        ObjectKind::Level | ObjectKind::CalculationItem => {}
                    }
                }
            }
        }

        self.mode = self.resting_mode();
    }

    fn finalize_all_objects(&mut self) {
        while !self.stack.is_empty() {
            self.finalize_object();
        }
    }

    fn finalize_table(&mut self) {
        if let Some(current) = self.current.take() {
            let table = current.finish();
            tracing::debug!(
                table = %table.name,
                columns = table.columns.len(),
                measures = table.measures.len(),
                "parsed table"
            );
            self.tables.push(table);
        }
        self.mode = Mode::Idle;
    }

    fn finish(mut self) -> Vec<Table> {
        if let Mode::Expression { capture, .. } = &self.mode {
            if capture.is_fenced() {
                let start = capture.start_line();
                self.sink.warn(
                    DiagnosticCode::TmdlUnterminatedBlock,
                    start,
                    "``` block is never closed; captured to end of file",
                );
            }
            self.close_expression();
        }

        self.finalize_all_objects();
        self.finalize_table();

        if self.tables.is_empty() {
            self.sink.warn(
                DiagnosticCode::TmdlMissingTableHeader,
                1,
                "file declares no table",
            );
        }

        self.tables
    }
}

/// `tables/Sales.tmdl` -> `Sales`
fn file_stem(path: &str) -> String {
    let name = path.rsplit(['/', '\\']).next().unwrap_or(path);
    name.strip_suffix(".tmdl").unwrap_or(name).to_string()
}
