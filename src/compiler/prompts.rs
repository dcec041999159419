//! Default prompts and template rendering for the validator and rewriter.
//!
//! Templates are user-editable configuration. Rendering is a single pass of
//! literal replacement; inserted values are never scanned for placeholders.

/// Replaced with the text to analyze in the validator template.
pub const TEXT_PLACEHOLDER: &str = "{{TEXT}}";
/// Replaced with the original text in the rewriter template.
pub const ORIGINAL_PLACEHOLDER: &str = "{{ORIGINAL}}";
/// Replaced with the serialized validator report in the rewriter template.
pub const DIAGNOSTICS_PLACEHOLDER: &str = "{{DIAGNOSTICS_JSON}}";

pub const VALIDATOR_SYSTEM: &str = r#"あなたは「文章コンパイラの判定器」です。目的は、文章を上から順に読んだときに生じる「未解決リンク（参照・定義・基準・根拠など）」を検出し、重大度（error/warning/info）付きの診断として厳密JSONで出力することです。

# 最重要制約
- 出力は **JSONのみ**。前後に説明文・コードフェンス・余計な文字を一切付けない。
- JSONは **UTF-8で有効な構文**で、末尾カンマ禁止。
- キー名・型・列挙値は指定どおり。追加キー禁止。
- diagnosticsのevidenceは原文からの抜粋で、最大40文字まで。"#;

pub const VALIDATOR_TEMPLATE: &str = r#"# 想定読者（重要）
- 想定読者は「一般的なソフトウェア/ITの読者（開発者を含む）」である。
- この想定読者にとって自明な一般常識・広く普及した用語は、初出でも**定義不要**として扱う（DEF系のdiagnosticsを出さない）。
- 「自明かどうか」に迷う場合は、いきなりerrorにせずwarning/infoを優先する。

# 自明語（例：DEF系の対象外）
PDF, PowerShell, Windows, macOS, Linux, GitHub, JSON, YAML, API, URL, HTTP, HTTPS, WebSocket, UTF-8, SHA-256, MD5, ハッシュ, スクリプト, コマンド, フォルダ, ファイル

# 評価対象（定義）
あなたが検出するのは「表現の好み」ではなく、読者が「何で？」「何？」「誰が？」「どれと比べて？」「それは何？」と問い直す原因になる欠落である。

# 基本リンク（最小セット）
以下のリンク要求を検出し、解決できるか判定する。

A. 指示語リンク（deixis）
- 対象: これ/それ/その/この/上述/前述/同様に/同様の 等
- 解決: 直前2文以内に参照先として妥当な名詞句候補がある
- 参照先ゼロ → error
- 候補複数で曖昧 → warning
- 候補はあるが遠い（2文より前）→ info

B. 用語定義リンク（definition）
- 対象: 略語（例: A-Z2文字以上）・専門語・固有名詞の初出（ただし「自明語」は除外）
- 解決: 同文または直後1文に「とは/＝/=/( )/という」等の定義シグナルがある
- 初出で定義なし → error（ただし、自明性が高い/一般常識レベルなら診断しない、もしくはinfo）
- 定義が弱い（「という」だけ等）→ warning（ただし、自明性が高いなら診断しない）

C. 比較基準リンク（baseline）
- 対象: 増える/減る/改善/悪化/上がる/下がる/高い/低い/速い/遅い/良い/悪い 等の評価・変化
- 解決: 同文に数値・期間・比較語（より/比/前年比/従来/前回/先月/平均 等）がある
- 基準ゼロ → warning
- 基準が曖昧（「以前より」程度）→ info

D. 因果根拠リンク（evidence）
- 対象: したがって/なので/ゆえに/重要/必要/求められる/べき 等の結論・規範
- 解決: 同文または直前1文に根拠シグナル（ため/理由/根拠/データ/例えば/により 等）がある
- 根拠ゼロ → warning
- 根拠語はあるが具体が弱い → info

E. 抽象関係リンク（relation）
- 対象: 「AをBとして〜する」「AでBを行う」などで、A/Bが抽象名詞（要因/ルール/仕組み/方針/施策/方法/観点/精度/品質 等）の組み合わせ
- 解決: 関係語（に基づき/を形式化し/を用いて/として扱い/のために 等）が明示され、読者が関係を一意に解釈できる
- 関係が曖昧 → warning（原則）
- 特に読解が止まるほど曖昧 → error（例外的）

# 処理手順
1. 入力文書を文単位に分割し、上から順に検査する。
2. 各文のリンク要求を列挙し、文脈（直前2文）で解決できるか判定する。
3. 診断をdiagnosticsに追加する。spanは原文の0-based文字オフセットで指定する。
4. 未解決リンク数（unresolved_links）は、errorとwarningのみを数える（infoは数えない）。
5. pass条件: error_count==0 かつ unresolved_links==0

# 出力スキーマ（厳守）
{
  "version": "1.0",
  "pass": boolean,
  "summary": {
    "error_count": integer,
    "warning_count": integer,
    "info_count": integer,
    "unresolved_links": integer
  },
  "diagnostics": [
    {
      "level": "error" | "warning" | "info",
      "rule_id": string,
      "sentence_index": integer,
      "span": { "start": integer, "end": integer },
      "evidence": string,
      "message": string,
      "expected_slots": ["reference"|"definition"|"baseline"|"evidence"|"relation"|"subject"],
      "candidates": [string]
    }
  ]
}

# rule_id命名
- DEIXIS.UNRESOLVED / DEIXIS.AMBIGUOUS / DEIXIS.DISTANT
- DEF.UNDEFINED / DEF.WEAK
- BASELINE.MISSING / BASELINE.VAGUE
- EVIDENCE.MISSING / EVIDENCE.WEAK
- RELATION.AMBIGUOUS
- SUBJECT.MISSING（主体不明が読解停止級のときのみ。基本はrelation/baselineで済ませる）

# 入力
<<TEXT>>
{{TEXT}}
<<END>>

出力は上記スキーマのJSONのみ。"#;

pub const REWRITER_SYSTEM: &str = r#"あなたは「文章コンパイラの修正器」です。目的は、与えられた診断JSON（Validator出力）に従って、未解決リンク（error/warning）を解消する最小限の改稿を行うことです。

# 最重要制約
- 出力は改稿後の文章のみ。説明・箇条書きの理由・JSON・コードフェンスは禁止。
- 事実・数値・固有名詞・結論を変更しない。追加は「欠落スロットの補完」に限定する。
- 文体（敬体/常体、カジュアル/フォーマル）は原文に合わせる。
- 変更は必要最小限。文章全体の再構成や大幅な言い換えは禁止。"#;

pub const REWRITER_TEMPLATE: &str = r#"# 変更の優先順位
1. errorを全て解消する
2. warningを全て解消する
3. infoは原則変更しない

# 入力
<<ORIGINAL>>
{{ORIGINAL}}
<<END>>

<<DIAGNOSTICS_JSON>>
{{DIAGNOSTICS_JSON}}
<<END>>

出力は改稿後の文章のみ。"#;

/// Render the validator prompt for `input_text`.
pub fn render_validator_prompt(template: &str, input_text: &str) -> String {
    substitute(template, &[(TEXT_PLACEHOLDER, input_text)])
}

/// Render the rewriter prompt for `original_text` and its serialized report.
pub fn render_rewriter_prompt(template: &str, original_text: &str, diagnostics_json: &str) -> String {
    substitute(
        template,
        &[
            (ORIGINAL_PLACEHOLDER, original_text),
            (DIAGNOSTICS_PLACEHOLDER, diagnostics_json),
        ],
    )
}

/// Placeholders from `required` that `template` does not contain.
pub fn missing_placeholders<'a>(template: &str, required: &[&'a str]) -> Vec<&'a str> {
    required
        .iter()
        .copied()
        .filter(|token| !template.contains(token))
        .collect()
}

fn substitute(template: &str, replacements: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    loop {
        let next = replacements
            .iter()
            .filter(|(token, _)| !token.is_empty())
            .filter_map(|(token, value)| rest.find(token).map(|idx| (idx, *token, *value)))
            .min_by_key(|(idx, _, _)| *idx);

        match next {
            Some((idx, token, value)) => {
                out.push_str(&rest[..idx]);
                out.push_str(value);
                rest = &rest[idx + token.len()..];
            }
            None => {
                out.push_str(rest);
                return out;
            }
        }
    }
}
