//! Layout configuration for the "Nota Control" electronic-declaration import.
//!
//! Everything in this module is data, not logic: the canonical field keys,
//! the header-alias table (DE-PARA) used to recognize user spreadsheets, the
//! exact order of the 21 body fields, and the literal header phrase the
//! receiving system requires. Layout revisions happen here, nowhere else.

use serde::{Deserialize, Serialize};

/// Canonical key for one of the 21 business data points of a declaration row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKey {
    Modelo,
    NumeroDocumento,
    ValorTributavel,
    ValorDocumento,
    Aliquota,
    DataEmissao,
    DataPagamento,
    CpfCnpjPrestador,
    RazaoSocialPrestador,
    InscricaoMunicipalPrestador,
    ImpostoRetido,
    CepPrestador,
    EnderecoPrestador,
    NumeroEndereco,
    BairroPrestador,
    CidadePrestador,
    UfPrestador,
    Ddd,
    TributadoMunicipio,
    ItemLc,
    UnidadeEconomica,
}

impl FieldKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldKey::Modelo => "modelo",
            FieldKey::NumeroDocumento => "numero_documento",
            FieldKey::ValorTributavel => "valor_tributavel",
            FieldKey::ValorDocumento => "valor_documento",
            FieldKey::Aliquota => "aliquota",
            FieldKey::DataEmissao => "data_emissao",
            FieldKey::DataPagamento => "data_pagamento",
            FieldKey::CpfCnpjPrestador => "cpf_cnpj_prestador",
            FieldKey::RazaoSocialPrestador => "razao_social_prestador",
            FieldKey::InscricaoMunicipalPrestador => "inscricao_municipal_prestador",
            FieldKey::ImpostoRetido => "imposto_retido",
            FieldKey::CepPrestador => "cep_prestador",
            FieldKey::EnderecoPrestador => "endereco_prestador",
            FieldKey::NumeroEndereco => "numero_endereco",
            FieldKey::BairroPrestador => "bairro_prestador",
            FieldKey::CidadePrestador => "cidade_prestador",
            FieldKey::UfPrestador => "uf_prestador",
            FieldKey::Ddd => "ddd",
            FieldKey::TributadoMunicipio => "tributado_municipio",
            FieldKey::ItemLc => "item_lc",
            FieldKey::UnidadeEconomica => "unidade_economica",
        }
    }

    /// Human-readable label used to prefix row error messages.
    pub fn label(&self) -> &'static str {
        match self {
            FieldKey::Modelo => "Modelo",
            FieldKey::NumeroDocumento => "Número Documento",
            FieldKey::ValorTributavel => "Valor Tributável",
            FieldKey::ValorDocumento => "Valor Documento",
            FieldKey::Aliquota => "Alíquota",
            FieldKey::DataEmissao => "Data Emissão",
            FieldKey::DataPagamento => "Data Pagamento",
            FieldKey::CpfCnpjPrestador => "CPF/CNPJ Prestador",
            FieldKey::RazaoSocialPrestador => "Razão Social Prestador",
            FieldKey::InscricaoMunicipalPrestador => "Inscrição Municipal Prestador",
            FieldKey::ImpostoRetido => "Imposto Retido",
            FieldKey::CepPrestador => "CEP Prestador",
            FieldKey::EnderecoPrestador => "Endereço Prestador",
            FieldKey::NumeroEndereco => "Número Endereço",
            FieldKey::BairroPrestador => "Bairro Prestador",
            FieldKey::CidadePrestador => "Cidade Prestador",
            FieldKey::UfPrestador => "Estado (UF)",
            FieldKey::Ddd => "DDD",
            FieldKey::TributadoMunicipio => "Tributado Município",
            FieldKey::ItemLc => "Item LC",
            FieldKey::UnidadeEconomica => "Unidade Econômica",
        }
    }
}

/// Accepted header spellings for one canonical key.
///
/// Matching is case-insensitive on trimmed header text; the lists enumerate
/// accented and unaccented variants explicitly so no diacritic folding is
/// needed at match time.
pub struct FieldAliases {
    pub key: FieldKey,
    pub aliases: &'static [&'static str],
}

pub const COLUMN_ALIASES: &[FieldAliases] = &[
    FieldAliases {
        key: FieldKey::Modelo,
        aliases: &["modelo", "tipo documento"],
    },
    FieldAliases {
        key: FieldKey::NumeroDocumento,
        aliases: &[
            "numero nf",
            "número nf",
            "numero documento",
            "número documento",
        ],
    },
    FieldAliases {
        key: FieldKey::ValorTributavel,
        aliases: &[
            "base de calculo",
            "base de cálculo",
            "valor tributavel",
            "valor tributável",
        ],
    },
    FieldAliases {
        key: FieldKey::ValorDocumento,
        aliases: &["valor total", "valor documento"],
    },
    FieldAliases {
        key: FieldKey::Aliquota,
        aliases: &["aliquota", "alíquota", "percentual iss"],
    },
    FieldAliases {
        key: FieldKey::DataEmissao,
        aliases: &["data emissao", "data emissão", "dt. emissao", "dt. emissão"],
    },
    FieldAliases {
        key: FieldKey::DataPagamento,
        aliases: &["data pagamento", "data pagto", "dt. pagamento", "dt. pagto"],
    },
    FieldAliases {
        key: FieldKey::CpfCnpjPrestador,
        aliases: &["cpf/cnpj prestador", "cpfcnpj prestador", "cnpj", "cpf"],
    },
    FieldAliases {
        key: FieldKey::RazaoSocialPrestador,
        aliases: &["nome prestador", "razao social", "razão social"],
    },
    FieldAliases {
        key: FieldKey::InscricaoMunicipalPrestador,
        aliases: &[
            "inscricao municipal prestador",
            "inscrição municipal prestador",
            "im prestador",
            "im",
        ],
    },
    FieldAliases {
        key: FieldKey::ImpostoRetido,
        aliases: &["iss retido", "imposto retido"],
    },
    FieldAliases {
        key: FieldKey::CepPrestador,
        aliases: &["cep prestador", "cep"],
    },
    FieldAliases {
        key: FieldKey::EnderecoPrestador,
        aliases: &["endereco prestador", "endereço prestador", "logouro"],
    },
    FieldAliases {
        key: FieldKey::NumeroEndereco,
        aliases: &["numero endereco", "número endereço", "numero", "número"],
    },
    FieldAliases {
        key: FieldKey::BairroPrestador,
        aliases: &["bairro prestador", "bairro"],
    },
    FieldAliases {
        key: FieldKey::CidadePrestador,
        aliases: &["cidade prestador", "cidade", "municipio", "município"],
    },
    FieldAliases {
        key: FieldKey::UfPrestador,
        aliases: &["uf/estado", "uf", "estado"],
    },
    FieldAliases {
        key: FieldKey::Ddd,
        aliases: &["ddd", "codigo area", "código área"],
    },
    FieldAliases {
        key: FieldKey::TributadoMunicipio,
        aliases: &[
            "tributado no municipio",
            "tributado no município",
            "tribut. municipio",
        ],
    },
    FieldAliases {
        key: FieldKey::ItemLc,
        aliases: &[
            "item lc",
            "item da lista",
            "item",
            "codigo lc",
            "código lc",
        ],
    },
    FieldAliases {
        key: FieldKey::UnidadeEconomica,
        aliases: &[
            "unidade economica",
            "unidade econômica",
            "unid. economica",
        ],
    },
];

/// The exact sequence of the 21 fields in a body line. The receiving system
/// reads positionally; this order is independent of input column order.
pub const BODY_FIELD_ORDER: [FieldKey; 21] = [
    FieldKey::Modelo,
    FieldKey::NumeroDocumento,
    FieldKey::ValorTributavel,
    FieldKey::ValorDocumento,
    FieldKey::Aliquota,
    FieldKey::DataEmissao,
    FieldKey::DataPagamento,
    FieldKey::CpfCnpjPrestador,
    FieldKey::RazaoSocialPrestador,
    FieldKey::InscricaoMunicipalPrestador,
    FieldKey::ImpostoRetido,
    FieldKey::CepPrestador,
    FieldKey::EnderecoPrestador,
    FieldKey::NumeroEndereco,
    FieldKey::BairroPrestador,
    FieldKey::CidadePrestador,
    FieldKey::UfPrestador,
    FieldKey::Ddd,
    FieldKey::TributadoMunicipio,
    FieldKey::ItemLc,
    FieldKey::UnidadeEconomica,
];

/// Fixed phrase closing the header line; identifies the export family.
pub const HEADER_PHRASE: &str = "EXPORTACAO DECLARACAO ELETRONICA-ONLINE-NOTA CONTROL";

/// Literal trailer line. The current layout revision has none; kept as
/// configuration so a future revision can add one without touching the
/// writer.
pub const TRAILER: Option<&str> = None;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_field_key_has_exactly_one_alias_entry() {
        for key in BODY_FIELD_ORDER {
            let entries = COLUMN_ALIASES.iter().filter(|a| a.key == key).count();
            assert_eq!(entries, 1, "field {:?} must have one alias entry", key);
        }
        assert_eq!(COLUMN_ALIASES.len(), BODY_FIELD_ORDER.len());
    }

    #[test]
    fn aliases_are_lowercase_trimmed() {
        for entry in COLUMN_ALIASES {
            for alias in entry.aliases {
                assert_eq!(*alias, alias.to_lowercase().trim(), "alias '{alias}'");
            }
        }
    }
}
