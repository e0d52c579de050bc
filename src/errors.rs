use thiserror::Error;

/// How bad a diagnostic is. The ordering matters: handlers compare the
/// worst severity seen on the current line to decide whether to keep going.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Warning,
    Minor,
    Error,
    Severe,
}

/// Every diagnostic the assembler can produce. The display text is what
/// ends up on stderr and in the listing file.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // warnings
    #[error("ASCII constant exceeds 4 characters")]
    AsciiTooBig,
    #[error("numeric constant exceeds 32 bits")]
    NumberTooBig,
    #[error("octal constant exceeds 8 bits")]
    OctalTooBig,
    #[error("specified type was ignored")]
    TypeIgnored,
    #[error("label ignored")]
    LabelIgnored,
    #[error("global data field not addressed through A5")]
    GlobalDataAddressNotA5,
    #[error("stack data not addressed through A6")]
    StackAddressNotA6,
    #[error("code label not addressed through PC")]
    CodeAddressNotPc,
    #[error("PC indirect displacement not a code address")]
    PcWithNonCodeAddr,
    #[error("absolute address used")]
    AbsoluteAddress,
    #[error("immediate value not a constant")]
    ImmediateNotAConstant,
    #[error("mismatch between size of instruction and size of operand")]
    InstrAndOperSizeMismatch,
    #[error("implicit alignment to word boundary")]
    AlignmentWarning,

    // minor errors
    #[error("invalid size code")]
    InvSizeCode,
    #[error("MOVEQ instruction constant out of range")]
    InvQuickConst,
    #[error("invalid vector number")]
    InvVectorNum,
    #[error("branch instruction displacement is out of range or invalid")]
    InvBranchDisp,
    #[error("displacement out of range")]
    InvDisp,
    #[error("absolute address exceeds 16 bits")]
    InvAbsAddress,
    #[error("immediate data exceeds 8 bits")]
    Inv8BitData,
    #[error("immediate data exceeds 16 bits")]
    Inv16BitData,
    #[error("origin value is odd (location counter set to next highest address)")]
    OddAddress,
    #[error("the symbol specified is not a register list symbol")]
    NotRegList,
    #[error("invalid constant shift count")]
    InvShiftCount,

    // errors
    #[error("undefined symbol")]
    UndefinedSymbol,
    #[error("division by zero attempted")]
    DivByZero,
    #[error("symbol multiply defined")]
    MultipleDefs,
    #[error("register list symbol not defined")]
    RegListUndef,
    #[error("block length is less than zero")]
    InvLength,
    #[error("using the same id for two different things")]
    KindDifferent,
    #[error("value has an invalid type")]
    InvValueCategory,
    #[error("symbol can not be used in expression")]
    InvSymbolInExpr,
    #[error("hex constant begins with invalid character")]
    InvHexConstant,
    #[error("undefined type")]
    UndefinedType,
    #[error("invalid or missing parameter size")]
    InvParmSize,
    #[error("symbol undefined or not a procedure nor a trap")]
    NotAProcedureNorTrap,
    #[error("procedure is declared but no entry point defined")]
    DeclaredButUndefinedProc,
    #[error("GLOBAL directive not in data block")]
    GlobalNotInData,
    #[error("number of bits exceeds specified type length")]
    BitCountTooBig,
    #[error("different member types within one bitmap")]
    InvalidBitmapMemberType,
    #[error("unmatching type sizes")]
    UnmatchingTypeSizes,
    #[error("Error")]
    UserError,
    #[error("temporary labels can only be used for code labels")]
    TempLabelCodeOnly,

    // severe errors
    #[error("invalid syntax")]
    Syntax,
    #[error("add .l to branch instruction to suppress optimization failure")]
    UnsuccessfullShortBranch,
    #[error("too many parameters specified")]
    TooManyParameters,
    #[error("missing parameter")]
    MissingParameters,
    #[error("expected ')' or ','")]
    ExpectedParenOrComma,
    #[error("expected ENUM name")]
    ExpectedEnumName,
    #[error("expected ENUM member or endenum")]
    ExpectedEnumMember,
    #[error("expected STRUCT name")]
    ExpectedStructName,
    #[error("expected STRUCT member or endstruct")]
    ExpectedStructMember,
    #[error("expected UNION name")]
    ExpectedUnionName,
    #[error("expected UNION member or endunion")]
    ExpectedUnionMember,
    #[error("expected local variable id")]
    ExpectedLocalVarId,
    #[error("expected global variable id")]
    ExpectedGlobalVarId,
    #[error("expected external variable id")]
    ExpectedExternVarId,
    #[error("expected expression")]
    ExpectedExpression,
    #[error("unexpected ENDPROC")]
    UnexpectedEndProc,
    #[error("value changed from pass 1 to pass 2")]
    GuardError,
    #[error("unterminated string")]
    UnterminatedString,
    #[error("unmatched right parenthesis")]
    UnmatchedRightParen,
    #[error("unmatched right bracket")]
    UnmatchedRightBracket,
    #[error("incomplete parameter specification")]
    IncompleteParameterSpec,
    #[error("unexpected ENDENUM found")]
    UnexpectedEndEnum,
    #[error("unexpected ENDSTRUCT found")]
    UnexpectedEndStruct,
    #[error("unexpected ENDUNION found")]
    UnexpectedEndUnion,
    #[error("unexpected ENUM found")]
    UnexpectedEnum,
    #[error("unexpected STRUCT found")]
    UnexpectedStruct,
    #[error("unexpected UNION found")]
    UnexpectedUnion,
    #[error("unexpected BEGINPROC found")]
    UnexpectedBeginProc,
    #[error("unexpected LOCAL directive")]
    UnexpectedLocal,
    #[error("expression does not calculate to 0 or 1")]
    InvalidBooleanValue,
    #[error("ENDIF without prior IF/IFDEF/IFNDEF")]
    UnmatchedEndIf,
    #[error("missing ENDIF for prior IF/IFDEF/IFNDEF")]
    MissingEndIf,
    #[error("ELSE found without prior IF/IFDEF/IFNDEF")]
    UnexpectedElseMissingIf,
    #[error("multiple ELSE for one IF/IFDEF/IFNDEF")]
    UnexpectedElseMultiple,
    #[error("unexpected entry point definition")]
    UnexpectedEntryDefinition,
    #[error("unexpected ENDPROXY found")]
    UnexpectedEndProxy,
    #[error("invalid temporary label")]
    InvalidTempLabel,
    #[error("required directive APPL is missing")]
    MissingAppl,
    #[error("missing application name in APPL directive")]
    MissingApplName,
    #[error("missing application ID in APPL directive")]
    MissingCreatorId,
    #[error("label required with this directive")]
    LabelRequired,
    #[error("invalid opcode")]
    InvOpcode,
    #[error("invalid operator")]
    InvOperator,
    #[error("invalid addressing mode")]
    InvAddrMode,
    #[error("symbol value differs between first and second pass")]
    PhaseError,
    #[error("failed to open resource file")]
    ResourceOpenFailed,
    #[error("resource not a usable bitmap")]
    ResourceBadBitmap,
    #[error("icon resource not 32x32")]
    ResourceBadIconSize,
    #[error("failed to open include file")]
    IncludeOpenFailed,
    #[error("include files nested too deep")]
    IncludeNestedTooDeep,
    #[error("missing trap definition")]
    MissingTrapDef,
    #[error("missing type specification")]
    MissingTypeSpec,
    #[error("internal error - guard value not recorded on pass 1")]
    InternalErrorGuardNotDef,
    #[error("internal error - invalid symbol kind for procedure name space")]
    InternalErrorSymbolKind,
    #[error("internal error - name space creation without current procedure")]
    InternalErrorNoCurrProc,
    #[error("expression nested too deep")]
    ExprNestedTooDeep,
    #[error("expected '('")]
    ExpectedLeftParen,
    #[error("expected ')'")]
    ExpectedRightParen,
    #[error("expected symbol")]
    ExpectedSymbol,
    #[error("expected type name")]
    ExpectedTypeName,
    #[error("expected procedure/trap name")]
    ExpectedProcName,
    #[error("expected '['")]
    ExpectedLeftBracket,
    #[error("expected ']'")]
    ExpectedRightBracket,
    #[error("expected '.' between variable and type")]
    ExpectedPeriodBeforeType,
}

impl ErrorCode {
    pub fn severity(self) -> Severity {
        use ErrorCode::*;
        match self {
            AsciiTooBig | NumberTooBig | OctalTooBig | TypeIgnored | LabelIgnored
            | GlobalDataAddressNotA5 | StackAddressNotA6 | CodeAddressNotPc
            | PcWithNonCodeAddr | AbsoluteAddress | ImmediateNotAConstant
            | InstrAndOperSizeMismatch | AlignmentWarning => Severity::Warning,

            InvSizeCode | InvQuickConst | InvVectorNum | InvBranchDisp | InvDisp
            | InvAbsAddress | Inv8BitData | Inv16BitData | OddAddress | NotRegList
            | InvShiftCount => Severity::Minor,

            UndefinedSymbol | DivByZero | MultipleDefs | RegListUndef | InvLength
            | KindDifferent | InvValueCategory | InvSymbolInExpr | InvHexConstant
            | UndefinedType | InvParmSize | NotAProcedureNorTrap
            | DeclaredButUndefinedProc | GlobalNotInData | BitCountTooBig
            | InvalidBitmapMemberType | UnmatchingTypeSizes | UserError
            | TempLabelCodeOnly => Severity::Error,

            _ => Severity::Severe,
        }
    }
}

/// A single positioned diagnostic, formatted the way the original tool
/// printed them: `file(line): severity: message: detail`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub code: ErrorCode,
    pub detail: Option<String>,
    pub file: String,
    pub line: u32,
}

impl std::error::Error for Diagnostic {}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = if self.code.severity() >= Severity::Minor {
            "error"
        } else {
            "warning"
        };
        match &self.detail {
            Some(d) => write!(
                f,
                "{}({}): {}: {}: {}",
                self.file, self.line, kind, self.code, d
            ),
            None => write!(f, "{}({}): {}: {}", self.file, self.line, kind, self.code),
        }
    }
}

/// Line result used throughout the assembler. `Err` means a severe error
/// already recorded in the log; the line cannot be usefully continued.
pub type AsmResult<T> = Result<T, Diagnostic>;

/// Collects diagnostics. Counting and message capture only happen once
/// reporting is switched on (pass 2); the per-line maximum severity is
/// tracked in every pass because handlers consult it for control flow.
#[derive(Debug, Default)]
pub struct ErrorLog {
    reporting: bool,
    file: String,
    line: u32,
    error_count: usize,
    warning_count: usize,
    line_max: Option<Severity>,
    messages: Vec<String>,
    pending: Vec<String>,
}

impl ErrorLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called at the start of pass 2. Counts restart from zero so only the
    /// emitting pass determines the exit code.
    pub fn start_reporting(&mut self) {
        self.reporting = true;
        self.error_count = 0;
        self.warning_count = 0;
        self.line_max = None;
    }

    pub fn set_position(&mut self, file: &str, line: u32) {
        if self.file != file {
            self.file = file.to_string();
        }
        self.line = line;
    }

    pub fn reset_line_status(&mut self) {
        self.line_max = None;
    }

    /// Record a diagnostic at the current position and hand it back so
    /// severe sites can `return Err(...)` with it.
    pub fn report(&mut self, code: ErrorCode, detail: Option<String>) -> Diagnostic {
        let diag = Diagnostic {
            code,
            detail,
            file: self.file.clone(),
            line: self.line,
        };
        let sev = code.severity();
        if self.line_max.is_none_or(|m| sev > m) {
            self.line_max = Some(sev);
        }
        if self.reporting {
            if sev >= Severity::Minor {
                self.error_count += 1;
            } else {
                self.warning_count += 1;
            }
            let text = diag.to_string();
            self.messages.push(text.clone());
            self.pending.push(text);
        }
        diag
    }

    pub fn line_at_least(&self, sev: Severity) -> bool {
        self.line_max.is_some_and(|m| m >= sev)
    }

    pub fn line_is_ok(&self) -> bool {
        self.line_max.is_none()
    }

    pub fn error_count(&self) -> usize {
        self.error_count
    }

    pub fn warning_count(&self) -> usize {
        self.warning_count
    }

    /// Messages raised since the last drain, in order. The listing writer
    /// pulls these after each source line so errors follow the line they
    /// concern.
    pub fn drain_pending(&mut self) -> Vec<String> {
        std::mem::take(&mut self.pending)
    }

    pub fn messages(&self) -> &[String] {
        &self.messages
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_tiers() {
        assert_eq!(ErrorCode::AlignmentWarning.severity(), Severity::Warning);
        assert_eq!(ErrorCode::InvQuickConst.severity(), Severity::Minor);
        assert_eq!(ErrorCode::DivByZero.severity(), Severity::Error);
        assert_eq!(ErrorCode::PhaseError.severity(), Severity::Severe);
        assert!(Severity::Severe > Severity::Error);
    }

    #[test]
    fn line_status_tracks_maximum() {
        let mut log = ErrorLog::new();
        log.set_position("t.asm", 3);
        log.report(ErrorCode::AlignmentWarning, None);
        assert!(!log.line_at_least(Severity::Error));
        log.report(ErrorCode::UndefinedSymbol, Some("foo".into()));
        assert!(log.line_at_least(Severity::Error));
        assert!(!log.line_at_least(Severity::Severe));
        log.reset_line_status();
        assert!(log.line_is_ok());
    }

    #[test]
    fn counts_only_while_reporting() {
        let mut log = ErrorLog::new();
        log.set_position("t.asm", 1);
        log.report(ErrorCode::UndefinedSymbol, None);
        assert_eq!(log.error_count(), 0);
        log.start_reporting();
        log.report(ErrorCode::UndefinedSymbol, None);
        log.report(ErrorCode::AlignmentWarning, None);
        assert_eq!(log.error_count(), 1);
        assert_eq!(log.warning_count(), 1);
        assert_eq!(log.drain_pending().len(), 2);
        assert!(log.drain_pending().is_empty());
    }
}
