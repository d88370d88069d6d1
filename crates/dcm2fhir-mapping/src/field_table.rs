//! 字段映射表
//!
//! 观察组件的规范顺序。写入端按此顺序生成组件，读取端按编码查找，
//! 顺序只用于保持线上格式稳定。

use dcm2fhir_core::{CodeableConcept, Coding, LOINC_SYSTEM};

/// 单个字段映射
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldMapping {
    /// 组件列表中的规范位置
    pub position: usize,
    /// DICOM关键字
    pub keyword: &'static str,
    /// 组件编码
    pub code: &'static str,
    /// 显示名称
    pub display: &'static str,
    /// 扁平记录中的字段名
    pub record_field: &'static str,
}

impl FieldMapping {
    /// 组件编码概念
    pub fn concept(&self) -> CodeableConcept {
        Coding::new(LOINC_SYSTEM, self.code)
            .with_display(self.display)
            .into()
    }
}

const fn field(
    position: usize,
    keyword: &'static str,
    code: &'static str,
    display: &'static str,
    record_field: &'static str,
) -> FieldMapping {
    FieldMapping {
        position,
        keyword,
        code,
        display,
        record_field,
    }
}

/// 检查级几何/曝光参数
pub const STUDY_PARAMETERS: [FieldMapping; 20] = [
    field(0, "BodyPartExamined", "bodypartexamined", "Body Part Examined", "body_part_examined"),
    field(1, "ScanOptions", "scanoptions", "Scan Options", "scan_options"),
    // 历史上 scanmode 组件承载的是层厚
    field(2, "SliceThickness", "scanmode", "Scan Mode", "scan_mode"),
    field(3, "KVP", "kvp", "KVP", "kvp"),
    field(4, "DataCollectionDiameter", "collectiondiameter", "Data Collection Diameter", "collection_diameter"),
    field(5, "ProtocolName", "protocolname", "Protocol Name", "protocol_name"),
    field(6, "ReconstructionDiameter", "reconstructiondiameter", "Reconstruction Diameter", "reconstruction_diameter"),
    field(7, "GantryDetectorTilt", "gantrydetectortilt", "Gantry/Detector Tilt", "gantry_detector_tilt"),
    field(8, "TableHeight", "tableheight", "Table Height", "table_height"),
    field(9, "RotationDirection", "rotationdirection", "Rotation Direction", "rotation_direction"),
    field(10, "ExposureTime", "exposuretime", "Exposure Time", "exposure_time"),
    field(11, "XRayTubeCurrent", "xraytubecurrent", "X-Ray Tube Current", "xray_tube_current"),
    field(12, "Exposure", "exposure", "Exposure", "exposure"),
    field(13, "FilterType", "filtertype", "Filter Type", "filter_type"),
    field(14, "GeneratorPower", "generatorpower", "Generator Power", "generator_power"),
    field(15, "FocalSpots", "focalspot", "Focal Spot(s)", "focal_spots"),
    field(16, "ConvolutionKernel", "convolutionkernel", "Convolution Kernel", "convolution_kernel"),
    field(17, "PatientPosition", "patientposition", "Patient Position", "patient_position"),
    field(18, "SpiralPitchFactor", "spiralpitchfactor", "Spiral Pitch Factor", "spiral_pitch_factor"),
    field(19, "CTDIvol", "ctdivol", "CTDIvol", "ctdi_vol"),
];

/// 序列级几何/像素编码/窗宽窗位参数
pub const SERIES_PARAMETERS: [FieldMapping; 23] = [
    field(0, "SeriesNumber", "seriesnumber", "Series Number", "seriesnumber"),
    field(1, "AcquisitionNumber", "acquisitionnumber", "Acquisition Number", "acquisitionnumber"),
    field(2, "InstanceNumber", "instancenumber", "Instance Number", "instancenumber"),
    field(3, "PatientOrientation", "patientorientation", "Patient Orientation", "patientorientation"),
    field(4, "ImagePositionPatient", "imagepositionpatient", "Image Position (Patient)", "imagepositionpatient"),
    field(5, "ImageOrientationPatient", "imageorientationpatient", "Image Orientation (Patient)", "imageorientationpatient"),
    field(6, "FrameOfReferenceUID", "frameofreferenceuid", "Frame of Reference UID", "frameofreferenceuid"),
    field(7, "PositionReferenceIndicator", "positionreferenceindicator", "Position Reference Indicator", "positionreferenceindicator"),
    field(8, "SliceLocation", "slicelocation", "Slice Location", "slicelocation"),
    field(9, "SamplesPerPixel", "samplesperpixel", "Samples per Pixel", "samplesperpixel"),
    field(10, "PhotometricInterpretation", "photometricinterpretation", "Photometric Interpretation", "photometricinterpretation"),
    field(11, "Rows", "rows", "Rows", "rows"),
    field(12, "Columns", "columns", "Columns", "columns"),
    field(13, "PixelSpacing", "pixelspacing", "Pixel Spacing", "pixelspacing"),
    field(14, "BitsAllocated", "bitsallocated", "Bits Allocated", "bitsallocated"),
    field(15, "BitsStored", "bitsstored", "Bits Stored", "bitsstored"),
    field(16, "HighBit", "highbit", "High Bit", "highbit"),
    field(17, "PixelRepresentation", "pixelrepresentation", "Pixel Representation", "pixelrepresentation"),
    field(18, "WindowCenter", "windowcenter", "Window Center", "windowcenter"),
    field(19, "WindowWidth", "windowwidth", "Window Width", "windowwidth"),
    field(20, "RescaleIntercept", "rescaleintercept", "Rescale Intercept", "rescaleintercept"),
    field(21, "RescaleSlope", "rescalevalue", "Rescale Slope", "rescalevalue"),
    field(22, "PerformedProcedureStepID", "performedproceduresstepid", "Performed Procedure Step ID", "performedproceduresstepid"),
];

/// 序列观察末尾的像素数据组件（base64文本），不展开到扁平记录
pub const PIXEL_DATA_COMPONENT: FieldMapping =
    field(23, "PixelData", "pixeldata", "Pixel Data", "pixeldata");
