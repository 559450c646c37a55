//! Static catalog of the standard SunSpec models the gateway understands.
//!
//! Layouts follow the SunSpec Alliance model definitions register for register;
//! the block lengths asserted in the tests below are the published `L` values.

use crate::prelude::*;
use crate::sunspec::point::{sym, DataType::*, PointDefinition as P, Symbol};
use std::collections::HashMap;

// ModelDefinition {{{
#[derive(Debug, PartialEq)]
pub struct ModelDefinition {
    pub id: u16,
    pub name: &'static str,
    pub label: &'static str,
    pub points: &'static [P],
    pub repeating: &'static [P],
}

impl ModelDefinition {
    pub fn fixed_block_length(&self) -> u16 {
        Self::block_length(self.points)
    }

    pub fn repeating_block_length(&self) -> u16 {
        Self::block_length(self.repeating)
    }

    pub fn has_repeating_block(&self) -> bool {
        !self.repeating.is_empty()
    }

    /// Shortest instance that still carries every mandatory fixed-block point.
    pub fn min_length(&self) -> u16 {
        let mut offset = 0;
        let mut min = 0;
        for point in self.points {
            offset += point.register_length();
            if point.mandatory {
                min = offset;
            }
        }
        min
    }

    /// Register offset (relative to the model body) and definition of a fixed-block point.
    pub fn fixed_point(&self, name: &str) -> Option<(u16, &'static P)> {
        let mut offset = 0;
        for point in self.points {
            if point.name == name {
                return Some((offset, point));
            }
            offset += point.register_length();
        }
        None
    }

    pub fn is_repeating_point(&self, name: &str) -> bool {
        self.repeating.iter().any(|p| p.name == name)
    }

    fn block_length(points: &[P]) -> u16 {
        points.iter().map(|p| p.register_length()).sum()
    }
} // }}}

// ModelRegistry {{{
#[derive(Clone, Debug)]
pub struct ModelRegistry {
    models: HashMap<u16, &'static ModelDefinition>,
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

impl ModelRegistry {
    /// Registry holding every model in the standard catalog.
    pub fn standard() -> Self {
        Self::with_models(CATALOG)
    }

    pub fn with_models(models: &[&'static ModelDefinition]) -> Self {
        Self {
            models: models.iter().map(|m| (m.id, *m)).collect(),
        }
    }

    pub fn lookup(&self, model_id: u16) -> Result<&'static ModelDefinition> {
        self.models
            .get(&model_id)
            .copied()
            .ok_or(Error::UnknownModel(model_id))
    }

    pub fn contains(&self, model_id: u16) -> bool {
        self.models.contains_key(&model_id)
    }

    /// Display name for a model ID, falling back to `Model_<id>` for vendor models.
    pub fn name_of(&self, model_id: u16) -> std::string::String {
        self.models
            .get(&model_id)
            .map(|m| m.name.to_string())
            .unwrap_or_else(|| format!("Model_{}", model_id))
    }

    pub fn ids(&self) -> Vec<u16> {
        let mut ids: Vec<u16> = self.models.keys().copied().collect();
        ids.sort_unstable();
        ids
    }
} // }}}

pub static CATALOG: &[&ModelDefinition] = &[
    &COMMON,
    &INVERTER_SINGLE_PHASE,
    &INVERTER_SPLIT_PHASE,
    &INVERTER_THREE_PHASE,
    &NAMEPLATE,
    &SETTINGS,
    &STATUS,
    &CONTROLS,
    &STORAGE,
    &MPPT,
];

// Common (1) {{{
pub static COMMON: ModelDefinition = ModelDefinition {
    id: 1,
    name: "common",
    label: "Common",
    points: &[
        P::new("Mn", String(16)).mandatory(),
        P::new("Md", String(16)).mandatory(),
        P::new("Opt", String(8)),
        P::new("Vr", String(8)),
        P::new("SN", String(16)).mandatory(),
        P::new("DA", Uint16).rw().range(1.0, 247.0),
        P::new("Pad", Pad),
    ],
    repeating: &[],
}; // }}}

// Inverter (101, 102, 103) {{{
static INVERTER_STATE: &[Symbol] = &[
    sym(1, "OFF"),
    sym(2, "SLEEPING"),
    sym(3, "STARTING"),
    sym(4, "MPPT"),
    sym(5, "THROTTLED"),
    sym(6, "SHUTTING_DOWN"),
    sym(7, "FAULT"),
    sym(8, "STANDBY"),
];

static INVERTER_EVENTS: &[Symbol] = &[
    sym(0, "GROUND_FAULT"),
    sym(1, "DC_OVER_VOLT"),
    sym(2, "AC_DISCONNECT"),
    sym(3, "DC_DISCONNECT"),
    sym(4, "GRID_DISCONNECT"),
    sym(5, "CABINET_OPEN"),
    sym(6, "MANUAL_SHUTDOWN"),
    sym(7, "OVER_TEMP"),
    sym(8, "OVER_FREQUENCY"),
    sym(9, "UNDER_FREQUENCY"),
    sym(10, "AC_OVER_VOLT"),
    sym(11, "AC_UNDER_VOLT"),
    sym(12, "BLOWN_STRING_FUSE"),
    sym(13, "UNDER_TEMP"),
    sym(14, "MEMORY_LOSS"),
    sym(15, "HW_TEST_FAILURE"),
];

/// The three inverter models share one layout; they differ only in which
/// per-phase points are mandatory.
macro_rules! inverter_points {
    ($phase_b:expr, $phase_c:expr) => {
        &[
            P::new("A", Uint16).sf("A_SF").units("A").mandatory(),
            P::new("AphA", Uint16).sf("A_SF").units("A").mandatory(),
            P {
                mandatory: $phase_b,
                ..P::new("AphB", Uint16).sf("A_SF").units("A")
            },
            P {
                mandatory: $phase_c,
                ..P::new("AphC", Uint16).sf("A_SF").units("A")
            },
            P::new("A_SF", ScaleFactor).mandatory(),
            P::new("PPVphAB", Uint16).sf("V_SF").units("V"),
            P::new("PPVphBC", Uint16).sf("V_SF").units("V"),
            P::new("PPVphCA", Uint16).sf("V_SF").units("V"),
            P::new("PhVphA", Uint16).sf("V_SF").units("V").mandatory(),
            P {
                mandatory: $phase_b,
                ..P::new("PhVphB", Uint16).sf("V_SF").units("V")
            },
            P {
                mandatory: $phase_c,
                ..P::new("PhVphC", Uint16).sf("V_SF").units("V")
            },
            P::new("V_SF", ScaleFactor).mandatory(),
            P::new("W", Int16).sf("W_SF").units("W").mandatory(),
            P::new("W_SF", ScaleFactor).mandatory(),
            P::new("Hz", Uint16).sf("Hz_SF").units("Hz").mandatory(),
            P::new("Hz_SF", ScaleFactor).mandatory(),
            P::new("VA", Int16).sf("VA_SF").units("VA"),
            P::new("VA_SF", ScaleFactor),
            P::new("VAr", Int16).sf("VAr_SF").units("var"),
            P::new("VAr_SF", ScaleFactor),
            P::new("PF", Int16).sf("PF_SF").units("Pct"),
            P::new("PF_SF", ScaleFactor),
            P::new("WH", Acc32).sf("WH_SF").units("Wh").mandatory(),
            P::new("WH_SF", ScaleFactor).mandatory(),
            P::new("DCA", Uint16).sf("DCA_SF").units("A"),
            P::new("DCA_SF", ScaleFactor),
            P::new("DCV", Uint16).sf("DCV_SF").units("V"),
            P::new("DCV_SF", ScaleFactor),
            P::new("DCW", Int16).sf("DCW_SF").units("W"),
            P::new("DCW_SF", ScaleFactor),
            P::new("TmpCab", Int16).sf("Tmp_SF").units("C").mandatory(),
            P::new("TmpSnk", Int16).sf("Tmp_SF").units("C"),
            P::new("TmpTrns", Int16).sf("Tmp_SF").units("C"),
            P::new("TmpOt", Int16).sf("Tmp_SF").units("C"),
            P::new("Tmp_SF", ScaleFactor).mandatory(),
            P::new("St", Enum16).symbols(INVERTER_STATE).mandatory(),
            P::new("StVnd", Enum16),
            P::new("Evt1", Bitfield32).symbols(INVERTER_EVENTS).mandatory(),
            P::new("Evt2", Bitfield32).mandatory(),
            P::new("EvtVnd1", Bitfield32),
            P::new("EvtVnd2", Bitfield32),
            P::new("EvtVnd3", Bitfield32),
            P::new("EvtVnd4", Bitfield32),
        ]
    };
}

pub static INVERTER_SINGLE_PHASE: ModelDefinition = ModelDefinition {
    id: 101,
    name: "inverter",
    label: "Inverter (Single Phase)",
    points: inverter_points!(false, false),
    repeating: &[],
};

pub static INVERTER_SPLIT_PHASE: ModelDefinition = ModelDefinition {
    id: 102,
    name: "inverter",
    label: "Inverter (Split Phase)",
    points: inverter_points!(true, false),
    repeating: &[],
};

pub static INVERTER_THREE_PHASE: ModelDefinition = ModelDefinition {
    id: 103,
    name: "inverter",
    label: "Inverter (Three Phase)",
    points: inverter_points!(true, true),
    repeating: &[],
}; // }}}

// Nameplate (120) {{{
static DER_TYPE: &[Symbol] = &[sym(4, "PV"), sym(82, "PV_STOR")];

pub static NAMEPLATE: ModelDefinition = ModelDefinition {
    id: 120,
    name: "nameplate",
    label: "Nameplate",
    points: &[
        P::new("DERTyp", Enum16).symbols(DER_TYPE).mandatory(),
        P::new("WRtg", Uint16).sf("WRtg_SF").units("W").mandatory(),
        P::new("WRtg_SF", ScaleFactor).mandatory(),
        P::new("VARtg", Uint16).sf("VARtg_SF").units("VA").mandatory(),
        P::new("VARtg_SF", ScaleFactor).mandatory(),
        P::new("VArRtgQ1", Int16).sf("VArRtg_SF").units("var").mandatory(),
        P::new("VArRtgQ2", Int16).sf("VArRtg_SF").units("var").mandatory(),
        P::new("VArRtgQ3", Int16).sf("VArRtg_SF").units("var").mandatory(),
        P::new("VArRtgQ4", Int16).sf("VArRtg_SF").units("var").mandatory(),
        P::new("VArRtg_SF", ScaleFactor).mandatory(),
        P::new("ARtg", Uint16).sf("ARtg_SF").units("A").mandatory(),
        P::new("ARtg_SF", ScaleFactor).mandatory(),
        P::new("PFRtgQ1", Int16).sf("PFRtg_SF").units("cos()").mandatory(),
        P::new("PFRtgQ2", Int16).sf("PFRtg_SF").units("cos()").mandatory(),
        P::new("PFRtgQ3", Int16).sf("PFRtg_SF").units("cos()").mandatory(),
        P::new("PFRtgQ4", Int16).sf("PFRtg_SF").units("cos()").mandatory(),
        P::new("PFRtg_SF", ScaleFactor).mandatory(),
        P::new("WHRtg", Uint16).sf("WHRtg_SF").units("Wh"),
        P::new("WHRtg_SF", ScaleFactor),
        P::new("AhrRtg", Uint16).sf("AhrRtg_SF").units("AH"),
        P::new("AhrRtg_SF", ScaleFactor),
        P::new("MaxChaRte", Uint16).sf("MaxChaRte_SF").units("W"),
        P::new("MaxChaRte_SF", ScaleFactor),
        P::new("MaxDisChaRte", Uint16).sf("MaxDisChaRte_SF").units("W"),
        P::new("MaxDisChaRte_SF", ScaleFactor),
        P::new("Pad", Pad),
    ],
    repeating: &[],
}; // }}}

// Basic Settings (121) {{{
static VAR_ACTION: &[Symbol] = &[sym(1, "SWITCH"), sym(2, "MAINTAIN")];
static CLC_TOT_VA: &[Symbol] = &[sym(1, "VECTOR"), sym(2, "ARITHMETIC")];
static CONN_PHASE: &[Symbol] = &[sym(1, "A"), sym(2, "B"), sym(3, "C")];

pub static SETTINGS: ModelDefinition = ModelDefinition {
    id: 121,
    name: "settings",
    label: "Basic Settings",
    points: &[
        P::new("WMax", Uint16).sf("WMax_SF").units("W").rw().mandatory(),
        P::new("VRef", Uint16).sf("VRef_SF").units("V").rw().mandatory(),
        P::new("VRefOfs", Int16).sf("VRefOfs_SF").units("V").rw().mandatory(),
        P::new("VMax", Uint16).sf("VMinMax_SF").units("V").rw(),
        P::new("VMin", Uint16).sf("VMinMax_SF").units("V").rw(),
        P::new("VAMax", Uint16).sf("VAMax_SF").units("VA").rw(),
        P::new("VArMaxQ1", Int16).sf("VArMax_SF").units("var").rw(),
        P::new("VArMaxQ2", Int16).sf("VArMax_SF").units("var").rw(),
        P::new("VArMaxQ3", Int16).sf("VArMax_SF").units("var").rw(),
        P::new("VArMaxQ4", Int16).sf("VArMax_SF").units("var").rw(),
        P::new("WGra", Uint16).sf("WGra_SF").units("% WMax/sec").rw(),
        P::new("PFMinQ1", Int16).sf("PFMin_SF").units("cos()").rw().range(-1.0, 1.0),
        P::new("PFMinQ2", Int16).sf("PFMin_SF").units("cos()").rw().range(-1.0, 1.0),
        P::new("PFMinQ3", Int16).sf("PFMin_SF").units("cos()").rw().range(-1.0, 1.0),
        P::new("PFMinQ4", Int16).sf("PFMin_SF").units("cos()").rw().range(-1.0, 1.0),
        P::new("VArAct", Enum16).symbols(VAR_ACTION).rw(),
        P::new("ClcTotVA", Enum16).symbols(CLC_TOT_VA).rw(),
        P::new("MaxRmpRte", Uint16).sf("MaxRmpRte_SF").units("% WGra").rw(),
        P::new("ECPNomHz", Uint16).sf("ECPNomHz_SF").units("Hz").rw(),
        P::new("ConnPh", Enum16).symbols(CONN_PHASE).rw(),
        P::new("WMax_SF", ScaleFactor).mandatory(),
        P::new("VRef_SF", ScaleFactor).mandatory(),
        P::new("VRefOfs_SF", ScaleFactor).mandatory(),
        P::new("VMinMax_SF", ScaleFactor),
        P::new("VAMax_SF", ScaleFactor),
        P::new("VArMax_SF", ScaleFactor),
        P::new("WGra_SF", ScaleFactor),
        P::new("PFMin_SF", ScaleFactor),
        P::new("MaxRmpRte_SF", ScaleFactor),
        P::new("ECPNomHz_SF", ScaleFactor),
    ],
    repeating: &[],
}; // }}}

// Measurements/Status (122) {{{
static PV_CONN: &[Symbol] = &[
    sym(0, "CONNECTED"),
    sym(1, "AVAILABLE"),
    sym(2, "OPERATING"),
    sym(3, "TEST"),
];
static ECP_CONN: &[Symbol] = &[sym(0, "CONNECTED")];
static CONTROL_FLAGS: &[Symbol] = &[
    sym(0, "FIXED_W"),
    sym(1, "FIXED_VAR"),
    sym(2, "FIXED_PF"),
    sym(3, "VOLT_VAR"),
    sym(4, "FREQ_WATT_PARAM"),
    sym(5, "FREQ_WATT_CURVE"),
    sym(6, "DYN_REACTIVE_CURRENT"),
    sym(7, "LVRT"),
    sym(8, "HVRT"),
    sym(9, "WATT_PF"),
    sym(10, "VOLT_WATT"),
    sym(12, "SCHEDULED"),
    sym(13, "LFRT"),
    sym(14, "HFRT"),
];
static RIDE_THROUGH: &[Symbol] = &[
    sym(0, "LVRT_ACTIVE"),
    sym(1, "HVRT_ACTIVE"),
    sym(2, "LFRT_ACTIVE"),
    sym(3, "HFRT_ACTIVE"),
];

pub static STATUS: ModelDefinition = ModelDefinition {
    id: 122,
    name: "status",
    label: "Measurements_Status",
    points: &[
        P::new("PVConn", Bitfield16).symbols(PV_CONN).mandatory(),
        P::new("StorConn", Bitfield16).symbols(PV_CONN).mandatory(),
        P::new("ECPConn", Bitfield16).symbols(ECP_CONN).mandatory(),
        P::new("ActWh", Acc64).units("Wh"),
        P::new("ActVAh", Acc64).units("VAh"),
        P::new("ActVArhQ1", Acc64).units("varh"),
        P::new("ActVArhQ2", Acc64).units("varh"),
        P::new("ActVArhQ3", Acc64).units("varh"),
        P::new("ActVArhQ4", Acc64).units("varh"),
        P::new("VArAval", Int16).sf("VArAval_SF").units("var"),
        P::new("VArAval_SF", ScaleFactor),
        P::new("WAval", Uint16).sf("WAval_SF").units("var"),
        P::new("WAval_SF", ScaleFactor),
        P::new("StSetLimMsk", Bitfield32).symbols(CONTROL_FLAGS),
        P::new("StActCtl", Bitfield32).symbols(CONTROL_FLAGS),
        P::new("TmSrc", String(4)),
        P::new("Tms", Uint32).units("Secs"),
        P::new("RtSt", Bitfield16).symbols(RIDE_THROUGH),
        P::new("Ris", Uint16).sf("Ris_SF").units("ohms"),
        P::new("Ris_SF", ScaleFactor),
    ],
    repeating: &[],
}; // }}}

// Immediate Controls (123) {{{
static CONN: &[Symbol] = &[sym(0, "DISCONNECT"), sym(1, "CONNECT")];
static ENABLE: &[Symbol] = &[sym(0, "DISABLED"), sym(1, "ENABLED")];
static VAR_PCT_MOD: &[Symbol] = &[
    sym(0, "NONE"),
    sym(1, "WMax"),
    sym(2, "VArMax"),
    sym(3, "VArAval"),
];

pub static CONTROLS: ModelDefinition = ModelDefinition {
    id: 123,
    name: "controls",
    label: "Immediate Controls",
    points: &[
        P::new("Conn_WinTms", Uint16).units("Secs").rw(),
        P::new("Conn_RvrtTms", Uint16).units("Secs").rw(),
        P::new("Conn", Enum16).symbols(CONN).rw().mandatory(),
        P::new("WMaxLimPct", Uint16).sf("WMaxLimPct_SF").units("% WMax").rw().range(0.0, 100.0).mandatory(),
        P::new("WMaxLimPct_WinTms", Uint16).units("Secs").rw(),
        P::new("WMaxLimPct_RvrtTms", Uint16).units("Secs").rw(),
        P::new("WMaxLimPct_RmpTms", Uint16).units("Secs").rw(),
        P::new("WMaxLim_Ena", Enum16).symbols(ENABLE).rw().mandatory(),
        P::new("OutPFSet", Int16).sf("OutPFSet_SF").units("cos()").rw().range(-1.0, 1.0).mandatory(),
        P::new("OutPFSet_WinTms", Uint16).units("Secs").rw(),
        P::new("OutPFSet_RvrtTms", Uint16).units("Secs").rw(),
        P::new("OutPFSet_RmpTms", Uint16).units("Secs").rw(),
        P::new("OutPFSet_Ena", Enum16).symbols(ENABLE).rw().mandatory(),
        P::new("VArWMaxPct", Int16).sf("VArPct_SF").units("% WMax").rw().range(-100.0, 100.0),
        P::new("VArMaxPct", Int16).sf("VArPct_SF").units("% VArMax").rw().range(-100.0, 100.0),
        P::new("VArAvalPct", Int16).sf("VArPct_SF").units("% VArAval").rw().range(-100.0, 100.0),
        P::new("VArPct_WinTms", Uint16).units("Secs").rw(),
        P::new("VArPct_RvrtTms", Uint16).units("Secs").rw(),
        P::new("VArPct_RmpTms", Uint16).units("Secs").rw(),
        P::new("VArPct_Mod", Enum16).symbols(VAR_PCT_MOD).rw(),
        P::new("VArPct_Ena", Enum16).symbols(ENABLE).rw().mandatory(),
        P::new("WMaxLimPct_SF", ScaleFactor).mandatory(),
        P::new("OutPFSet_SF", ScaleFactor).mandatory(),
        P::new("VArPct_SF", ScaleFactor),
    ],
    repeating: &[],
}; // }}}

// Storage (124) {{{
static STOR_CTL: &[Symbol] = &[sym(0, "CHARGE"), sym(1, "DISCHARGE")];
static CHARGE_STATE: &[Symbol] = &[
    sym(1, "OFF"),
    sym(2, "EMPTY"),
    sym(3, "DISCHARGING"),
    sym(4, "CHARGING"),
    sym(5, "FULL"),
    sym(6, "HOLDING"),
    sym(7, "TESTING"),
];
static CHARGE_SOURCE: &[Symbol] = &[sym(0, "PV"), sym(1, "GRID")];

pub static STORAGE: ModelDefinition = ModelDefinition {
    id: 124,
    name: "storage",
    label: "Storage",
    points: &[
        P::new("WChaMax", Uint16).sf("WChaMax_SF").units("W").rw().mandatory(),
        P::new("WChaGra", Uint16).sf("WChaDisChaGra_SF").units("% WChaMax/sec").rw().mandatory(),
        P::new("WDisChaGra", Uint16).sf("WChaDisChaGra_SF").units("% WChaMax/sec").rw().mandatory(),
        P::new("StorCtl_Mod", Bitfield16).symbols(STOR_CTL).rw().mandatory(),
        P::new("VAChaMax", Uint16).sf("VAChaMax_SF").units("VA").rw(),
        P::new("MinRsvPct", Uint16).sf("MinRsvPct_SF").units("% WChaMax").rw().range(0.0, 100.0),
        P::new("ChaState", Uint16).sf("ChaState_SF").units("% AhrRtg"),
        P::new("StorAval", Uint16).sf("StorAval_SF").units("AH"),
        P::new("InBatV", Uint16).sf("InBatV_SF").units("V"),
        P::new("ChaSt", Enum16).symbols(CHARGE_STATE),
        P::new("OutWRte", Int16).sf("InOutWRte_SF").units("% WDisChaMax").rw().range(-100.0, 100.0),
        P::new("InWRte", Int16).sf("InOutWRte_SF").units("% WChaMax").rw().range(-100.0, 100.0),
        P::new("InOutWRte_WinTms", Uint16).units("Secs").rw(),
        P::new("InOutWRte_RvrtTms", Uint16).units("Secs").rw(),
        P::new("InOutWRte_RmpTms", Uint16).units("Secs").rw(),
        P::new("ChaGriSet", Enum16).symbols(CHARGE_SOURCE).rw(),
        P::new("WChaMax_SF", ScaleFactor).mandatory(),
        P::new("WChaDisChaGra_SF", ScaleFactor).mandatory(),
        P::new("VAChaMax_SF", ScaleFactor),
        P::new("MinRsvPct_SF", ScaleFactor),
        P::new("ChaState_SF", ScaleFactor),
        P::new("StorAval_SF", ScaleFactor),
        P::new("InBatV_SF", ScaleFactor),
        P::new("InOutWRte_SF", ScaleFactor),
    ],
    repeating: &[],
}; // }}}

// Multiple MPPT (160) {{{
static MPPT_STATE: &[Symbol] = &[
    sym(1, "OFF"),
    sym(2, "SLEEPING"),
    sym(3, "STARTING"),
    sym(4, "MPPT"),
    sym(5, "THROTTLED"),
    sym(6, "SHUTTING_DOWN"),
    sym(7, "FAULT"),
    sym(8, "STANDBY"),
    sym(9, "TEST"),
];

static MPPT_EVENTS: &[Symbol] = &[
    sym(0, "GROUND_FAULT"),
    sym(1, "INPUT_OVER_VOLTAGE"),
    sym(3, "DC_DISCONNECT"),
    sym(5, "CABINET_OPEN"),
    sym(6, "MANUAL_SHUTDOWN"),
    sym(7, "OVER_TEMP"),
    sym(12, "BLOWN_FUSE"),
    sym(13, "UNDER_TEMP"),
    sym(14, "MEMORY_LOSS"),
    sym(15, "ARC_DETECTION"),
    sym(20, "TEST_FAILED"),
    sym(21, "INPUT_UNDER_VOLTAGE"),
    sym(22, "INPUT_OVER_CURRENT"),
];

pub static MPPT: ModelDefinition = ModelDefinition {
    id: 160,
    name: "mppt",
    label: "Multiple MPPT Inverter Extension Model",
    points: &[
        P::new("DCA_SF", ScaleFactor),
        P::new("DCV_SF", ScaleFactor),
        P::new("DCW_SF", ScaleFactor),
        P::new("DCWH_SF", ScaleFactor),
        P::new("Evt", Bitfield32).symbols(MPPT_EVENTS),
        P::new("N", Uint16),
        P::new("TmsPer", Uint16),
    ],
    repeating: &[
        P::new("ID", Uint16),
        P::new("IDStr", String(8)),
        P::new("DCA", Uint16).sf("DCA_SF").units("A"),
        P::new("DCV", Uint16).sf("DCV_SF").units("V"),
        P::new("DCW", Uint16).sf("DCW_SF").units("W"),
        P::new("DCWH", Acc32).sf("DCWH_SF").units("Wh"),
        P::new("Tms", Uint32).units("Secs"),
        P::new("Tmp", Int16).units("C"),
        P::new("DCSt", Enum16).symbols(MPPT_STATE),
        P::new("DCEvt", Bitfield32).symbols(MPPT_EVENTS),
    ],
}; // }}}
