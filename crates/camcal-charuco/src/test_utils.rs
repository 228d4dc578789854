use camcal_aruco::Dictionary;
use camcal_core::DictionaryName;

pub fn synthetic_dictionary(count: usize) -> Dictionary {
    Dictionary::generate(DictionaryName::Dict4x4_50, count, 4, 11).expect("dictionary")
}
